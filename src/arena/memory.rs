use crate::arena::Arena;
use crate::heap::Address;
use crate::{ErrorKind, Result};

/// メモリベースの`Arena`の実装.
///
/// 内部的には`Vec<u8>`を保持し、伸長された領域はゼロで初期化される.
///
/// 伸長可能な上限(キャパシティ)を持ち、それを超える伸長要求は
/// `ErrorKind::ArenaExhausted`エラーとなる.
/// キャパシティを小さく設定することで、記憶領域の枯渇を模擬することが可能.
#[derive(Debug, Clone)]
pub struct MemoryArena {
    memory: Vec<u8>,
    capacity: u32,
}
impl MemoryArena {
    /// 取り得る最大のキャパシティを持つ、空の`MemoryArena`インスタンスを生成する.
    pub fn new() -> Self {
        Self::with_capacity(Address::MAX)
    }

    /// 指定されたキャパシティを持つ、空の`MemoryArena`インスタンスを生成する.
    ///
    /// `capacity`が`Address::MAX`を超えている場合には、`Address::MAX`に切り詰められる.
    pub fn with_capacity(capacity: u32) -> Self {
        MemoryArena {
            memory: Vec::new(),
            capacity: capacity.min(Address::MAX),
        }
    }

    /// 伸長可能な上限を返す.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 伸長可能な上限を変更する.
    ///
    /// 現在の長さよりも小さい値が指定された場合には、現在の長さに切り上げられる
    /// (i.e., 既に提供済みの領域が失われることはない).
    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity.min(Address::MAX).max(self.len());
    }

    /// 伸長可能な残りのバイト数を返す.
    pub fn remaining(&self) -> u32 {
        self.capacity - self.len()
    }
}
impl Default for MemoryArena {
    fn default() -> Self {
        Self::new()
    }
}
impl Arena for MemoryArena {
    fn grow(&mut self, size: u32) -> Result<Address> {
        track_assert!(
            size <= self.remaining(),
            ErrorKind::ArenaExhausted,
            "size={}, len={}, capacity={}",
            size,
            self.len(),
            self.capacity
        );
        let start = self.end();
        let new_len = self.memory.len() + size as usize;
        self.memory.resize(new_len, 0);
        Ok(start)
    }
    fn len(&self) -> u32 {
        self.memory.len() as u32
    }
    fn as_bytes(&self) -> &[u8] {
        &self.memory
    }
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn it_works() -> TestResult {
        let mut arena = MemoryArena::with_capacity(1024);
        assert!(arena.is_empty());
        assert_eq!(arena.capacity(), 1024);

        let start = track!(arena.grow(512))?;
        assert_eq!(start, Address::from(0));
        assert_eq!(arena.len(), 512);
        assert_eq!(arena.as_bytes(), &[0; 512][..]);

        arena.as_bytes_mut()[511] = 7;
        let start = track!(arena.grow(256))?;
        assert_eq!(start, Address::from(512));
        assert_eq!(arena.end(), Address::from(768));
        assert_eq!(arena.as_bytes()[511], 7);
        assert_eq!(arena.remaining(), 256);
        Ok(())
    }

    #[test]
    fn exhaustion() -> TestResult {
        let mut arena = MemoryArena::with_capacity(1024);
        track!(arena.grow(1000))?;

        let e = arena.grow(32).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::ArenaExhausted));
        assert_eq!(arena.len(), 1000);

        track!(arena.grow(24))?;
        assert_eq!(arena.remaining(), 0);
        Ok(())
    }

    #[test]
    fn capacity_never_shrinks_below_len() -> TestResult {
        let mut arena = MemoryArena::new();
        assert_eq!(arena.capacity(), Address::MAX);

        track!(arena.grow(64))?;
        arena.set_capacity(16);
        assert_eq!(arena.capacity(), 64);
        assert!(arena.grow(8).is_err());

        arena.set_capacity(128);
        assert_eq!(track!(arena.grow(8))?, Address::from(64));
        Ok(())
    }
}
