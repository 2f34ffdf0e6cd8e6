//! アリーナ(伸長可能な線形領域)のインターフェース定義と実装群.
//!
//! このモジュールは[Heap](../heap/struct.Heap.html)がブロックの配置に使用する
//! バイト列を提供する.
pub use self::memory::MemoryArena;

use crate::heap::Address;
use crate::Result;

mod memory;

/// アリーナを表すトレイト.
///
/// "アリーナ"は「末尾方向にのみ伸長可能な、連続したバイト列」を意味し、
/// ヒープはこの上にブロック群を配置する.
///
/// ヒープは、このトレイト経由以外の方法で記憶領域を確保することはない.
///
/// # 実装上の制約
///
/// - 伸長された領域は、常に直前の領域の末尾に連続して追加される
/// - 一度提供した領域を縮小したり、別の位置に移動したりしてはならない
///   - ただし、アドレスはアリーナ先頭からのオフセットであるため、
///     内部バッファの再配置(e.g., `Vec`の再確保)自体は問題ない
/// - アリーナの長さは`Address::MAX`を超えてはならない
pub trait Arena {
    /// アリーナを`size`バイト分伸長し、追加された領域の開始位置を返す.
    ///
    /// # Errors
    ///
    /// 背後の記憶領域が枯渇しており、伸長ができない場合には、
    /// 種類が`ErrorKind::ArenaExhausted`のエラーが返される.
    /// この場合、アリーナの状態は変更されない.
    fn grow(&mut self, size: u32) -> Result<Address>;

    /// アリーナの現在の長さ(バイト単位)を返す.
    fn len(&self) -> u32;

    /// アリーナの内容を返す.
    fn as_bytes(&self) -> &[u8];

    /// アリーナの内容を、変更可能な形で返す.
    fn as_bytes_mut(&mut self) -> &mut [u8];

    /// アリーナが空かどうかを判定する.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// アリーナの末尾(次に伸長される領域の開始位置)を返す.
    fn end(&self) -> Address {
        Address::from_u32(self.len()).expect("too large arena")
    }
}
impl<'a, A: Arena> Arena for &'a mut A {
    fn grow(&mut self, size: u32) -> Result<Address> {
        (**self).grow(size)
    }
    fn len(&self) -> u32 {
        (**self).len()
    }
    fn as_bytes(&self) -> &[u8] {
        (**self).as_bytes()
    }
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        (**self).as_bytes_mut()
    }
}
