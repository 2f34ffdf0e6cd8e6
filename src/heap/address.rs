use std::fmt;
use std::ops::{Add, Sub};

/// アリーナ内の位置を示すための31bit幅の整数値.
///
/// アドレスの単位は**バイト**であり、アリーナの先頭からのオフセットを表している.
///
/// ブロックのサイズはタグ内の31bitで表現されるため、
/// アリーナ全体の大きさもこの範囲に収まるように制限されている.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Address(u32);
impl Address {
    /// 取り得るアドレスの最大値.
    pub const MAX: u32 = (1 << 31) - 1;

    /// アドレスの値を返す.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// アドレスの値を、バイト列のインデックスとして使える形で返す.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// `value`を対応する位置のアドレスに変換する.
    ///
    /// `value`の値が31bit以内に収まらない場合には`None`が返される.
    pub fn from_u32(value: u32) -> Option<Self> {
        if value <= Self::MAX {
            Some(Address(value))
        } else {
            None
        }
    }

    /// 二つのアドレスの間のバイト数を返す.
    ///
    /// `self`が`origin`よりも前方にある場合には`None`が返される.
    pub fn offset_from(self, origin: Address) -> Option<u32> {
        self.0.checked_sub(origin.0)
    }
}
impl From<u16> for Address {
    fn from(from: u16) -> Self {
        Address(u32::from(from))
    }
}
impl Add<u32> for Address {
    type Output = Self;
    fn add(self, rhs: u32) -> Self {
        let value = self.0.checked_add(rhs).expect("address overflow");
        Address::from_u32(value).expect("address overflow")
    }
}
impl Sub<u32> for Address {
    type Output = Self;
    fn sub(self, rhs: u32) -> Self {
        let value = self.0.checked_sub(rhs).expect("address underflow");
        Address(value)
    }
}
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        assert_eq!(Address::from_u32(0).map(|a| a.as_u32()), Some(0));
        assert_eq!(
            Address::from_u32(Address::MAX).map(|a| a.as_u32()),
            Some(Address::MAX)
        );
        assert_eq!(Address::from_u32(Address::MAX + 1), None);

        assert_eq!(Address::from(10) + 2, Address::from(12));
        assert_eq!(Address::from(10) - 2, Address::from(8));
        assert_eq!(Address::from(10).offset_from(Address::from(8)), Some(2));
        assert_eq!(Address::from(8).offset_from(Address::from(10)), None);
        assert_eq!(Address::from(255).to_string(), "0xff");
    }

    #[test]
    #[should_panic]
    fn overflow() {
        let _ = Address::from_u32(Address::MAX).map(|a| a + 1);
    }

    #[test]
    #[should_panic]
    fn underflow() {
        let _ = Address::from(0) - 1;
    }
}
