use std::fmt;

use super::MAX_BLOCK_SIZE;

/// ブロックの両端に置かれる境界タグ.
///
/// アリーナ上では一ワード(8バイト)を占有し、以下の形式でエンコードされる:
///
/// ```text
///  63       32   31        1   0
///  --------------------------------
/// |   unused   | block_size | a/f |
///  --------------------------------
/// ```
///
/// 下位32bitはリトルエンディアンで格納され、上位32bitは常にゼロが書き込まれる.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    size: u32,
    allocated: bool,
}
impl Tag {
    /// 新しい`Tag`インスタンスを生成する.
    ///
    /// # Panics
    ///
    /// `size`が31bitで表現できない場合には、現在のスレッドがパニックする.
    pub fn new(size: u32, allocated: bool) -> Self {
        assert!(size <= MAX_BLOCK_SIZE, "too large block: {}", size);
        Tag { size, allocated }
    }

    /// 割当済みブロック用のタグを生成する.
    pub fn allocated(size: u32) -> Self {
        Self::new(size, true)
    }

    /// 空きブロック用のタグを生成する.
    pub fn free(size: u32) -> Self {
        Self::new(size, false)
    }

    /// ブロックのサイズ(両端のタグを含むバイト数)を返す.
    pub fn size(self) -> u32 {
        self.size
    }

    /// 割当済みブロックのタグかどうかを判定する.
    pub fn is_allocated(self) -> bool {
        self.allocated
    }

    /// 空きブロックのタグかどうかを判定する.
    pub fn is_free(self) -> bool {
        !self.allocated
    }

    /// タグをアリーナ上の一ワードにエンコードする.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagheap::block::Tag;
    ///
    /// assert_eq!(Tag::allocated(8).encode(), 0x11);
    /// assert_eq!(Tag::free(32).encode(), 0x40);
    /// assert_eq!(Tag::allocated(0).encode(), 0x1);
    /// ```
    pub fn encode(self) -> u64 {
        u64::from((self.size << 1) | u32::from(self.allocated))
    }

    /// アリーナ上の一ワードからタグをデコードする.
    ///
    /// 上位32bitの値は無視される.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagheap::block::Tag;
    ///
    /// assert_eq!(Tag::decode(0x11), Tag::allocated(8));
    /// assert_eq!(Tag::decode(0xFFFF_FFFF_0000_0040), Tag::free(32));
    /// ```
    pub fn decode(word: u64) -> Self {
        let bits = word as u32;
        Tag {
            size: bits >> 1,
            allocated: bits & 1 == 1,
        }
    }
}
impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = if self.allocated { 'a' } else { 'f' };
        write!(f, "[{}:{}]", self.size, state)
    }
}
