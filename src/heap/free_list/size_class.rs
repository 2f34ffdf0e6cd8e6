use std::fmt;

use crate::block::ALIGNMENT;

/// サイズクラスの総数.
pub const CLASS_COUNT: usize = 128;

/// 厳密なサイズ(アライメント単位毎)で分類されるクラスの数.
///
/// `1..=64`単位(`8..=512`バイト)のブロックは、それぞれ専用のクラスを持つ.
pub const EXACT_CLASS_COUNT: usize = 64;

/// 空きブロックのサイズクラス.
///
/// - `0..64`: `units - 1` (`units`はアライメント単位で表したブロックサイズ)
/// - `64..128`: `64 + floor(log2(units)) - 6` (`CLASS_COUNT - 1`で頭打ち)
///
/// 小さいサイズでは細かい粒度を保ちつつ、大きいサイズではクラス数を抑えている.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeClass(u8);
impl SizeClass {
    /// 最大のサイズクラス.
    pub const LAST: SizeClass = SizeClass((CLASS_COUNT - 1) as u8);

    /// 指定サイズ(バイト単位)のブロックが属するクラスを返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagheap::heap::SizeClass;
    ///
    /// assert_eq!(SizeClass::of(32).as_usize(), 3);
    /// assert_eq!(SizeClass::of(512).as_usize(), 63);
    /// assert_eq!(SizeClass::of(520).as_usize(), 64);
    /// assert_eq!(SizeClass::of(1024).as_usize(), 65);
    /// assert_eq!(SizeClass::of(65536).as_usize(), 71);
    /// ```
    pub fn of(size: u32) -> Self {
        let units = (size / ALIGNMENT).max(1);
        let class = if units as usize <= EXACT_CLASS_COUNT {
            units as usize - 1
        } else {
            let log2 = (31 - units.leading_zeros()) as usize;
            EXACT_CLASS_COUNT + log2 - 6
        };
        SizeClass(class.min(CLASS_COUNT - 1) as u8)
    }

    /// クラスの番号を返す.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// このクラスから、最大のクラスまでを昇順に列挙する.
    pub fn and_above(self) -> impl Iterator<Item = SizeClass> {
        (self.0..=Self::LAST.0).map(SizeClass)
    }
}
impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

    #[test]
    fn exact_classes() {
        assert_eq!(SizeClass::of(0).as_usize(), 0);
        assert_eq!(SizeClass::of(8).as_usize(), 0);
        assert_eq!(SizeClass::of(MIN_BLOCK_SIZE).as_usize(), 3);
        assert_eq!(SizeClass::of(40).as_usize(), 4);
        for units in 1..=64 {
            assert_eq!(SizeClass::of(units * ALIGNMENT).as_usize(), units as usize - 1);
        }
    }

    #[test]
    fn exponential_classes() {
        assert_eq!(SizeClass::of(65 * 8).as_usize(), 64);
        assert_eq!(SizeClass::of(127 * 8).as_usize(), 64);
        assert_eq!(SizeClass::of(128 * 8).as_usize(), 65);
        assert_eq!(SizeClass::of(255 * 8).as_usize(), 65);
        assert_eq!(SizeClass::of(256 * 8).as_usize(), 66);
        assert_eq!(SizeClass::of(MAX_BLOCK_SIZE).as_usize(), 64 + 27 - 6);
    }

    #[test]
    fn classes_are_monotonic() {
        let mut prev = SizeClass::of(MIN_BLOCK_SIZE);
        let mut size = MIN_BLOCK_SIZE;
        while size < 1 << 20 {
            let class = SizeClass::of(size);
            assert!(prev <= class);
            prev = class;
            size += ALIGNMENT;
        }
    }

    #[test]
    fn and_above() {
        let classes = SizeClass::of(1 << 30).and_above().collect::<Vec<_>>();
        assert_eq!(classes.first().map(|c| c.as_usize()), Some(64 + 27 - 6));
        assert_eq!(classes.last(), Some(&SizeClass::LAST));
        assert_eq!(SizeClass::LAST.and_above().count(), 1);
    }
}
