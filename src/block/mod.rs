//! ヒープを構成するブロックのレイアウトと、境界タグの読み書き.
//!
//! 各ブロックは以下の形式を持つ:
//!
//! ```text
//!  block                                         next block
//!  ----------------------------------------------------------
//! | header(8) |          payload          | footer(8) | ...
//!  ----------------------------------------------------------
//!             ^
//!             +-- 利用者に返されるアドレス
//! ```
//!
//! ヘッダとフッタには常に同じ[Tag]が書き込まれている.
//!
//! このモジュールの関数群は、呼び出し側が正しいブロック位置を渡すことを前提としており、
//! 不正な位置が渡された場合の検査は行わない.
//!
//! [Tag]: ./struct.Tag.html
use byteorder::{ByteOrder, LittleEndian};

pub use self::tag::Tag;

use crate::heap::Address;

mod tag;

/// アライメントの単位(バイト数).
///
/// 全てのブロックのサイズと、利用者に返されるアドレスは、この値の倍数となる.
pub const ALIGNMENT: u32 = 8;

/// 境界タグ一つ分のバイト数.
pub const TAG_SIZE: u32 = 8;

/// 割当済みブロックの固定オーバヘッド(ヘッダとフッタ).
pub const OVERHEAD: u32 = 2 * TAG_SIZE;

/// ブロックの最小サイズ.
///
/// 空きブロックはヘッダとフッタに加えて、フリーリスト用の二つのリンクを保持する必要がある.
pub const MIN_BLOCK_SIZE: u32 = 32;

/// ブロックの最大サイズ.
///
/// タグ内の31bitで表現可能な、アライメント単位の倍数の最大値.
pub const MAX_BLOCK_SIZE: u32 = (1 << 31) - ALIGNMENT;

/// 指定値より後方の最初のアライメント境界を返す.
///
/// 結果が`u32`に収まらない場合には`None`が返される.
///
/// # Examples
///
/// ```
/// use tagheap::block;
///
/// assert_eq!(block::ceil_align(0), Some(0));
/// assert_eq!(block::ceil_align(1), Some(8));
/// assert_eq!(block::ceil_align(8), Some(8));
/// assert_eq!(block::ceil_align(17), Some(24));
/// assert_eq!(block::ceil_align(u32::max_value()), None);
/// ```
pub fn ceil_align(size: u32) -> Option<u32> {
    size.checked_add(ALIGNMENT - 1).map(|n| n & !(ALIGNMENT - 1))
}

/// 指定値がアライメント境界に沿っているかどうかを判定する.
///
/// # Examples
///
/// ```
/// use tagheap::block;
///
/// assert!(block::is_aligned(0));
/// assert!(block::is_aligned(16));
/// assert!(!block::is_aligned(12));
/// ```
pub fn is_aligned(value: u32) -> bool {
    value % ALIGNMENT == 0
}

/// `size`バイトのペイロードを保持するために必要なブロックサイズを返す.
///
/// オーバヘッドを加えた上でアライメントを行い、最小ブロックサイズ未満であれば切り上げる.
/// 結果が`MAX_BLOCK_SIZE`を超える場合には`None`が返される.
///
/// # Examples
///
/// ```
/// use tagheap::block;
///
/// assert_eq!(block::adjusted_size(1), Some(32));
/// assert_eq!(block::adjusted_size(16), Some(32));
/// assert_eq!(block::adjusted_size(17), Some(40));
/// assert_eq!(block::adjusted_size(100), Some(120));
/// assert_eq!(block::adjusted_size(u32::max_value()), None);
/// ```
pub fn adjusted_size(size: u32) -> Option<u32> {
    let size = ceil_align(size.checked_add(OVERHEAD)?)?;
    if size > MAX_BLOCK_SIZE {
        None
    } else if size < MIN_BLOCK_SIZE {
        Some(MIN_BLOCK_SIZE)
    } else {
        Some(size)
    }
}

/// 指定位置のタグを読み込む.
pub fn read(bytes: &[u8], address: Address) -> Tag {
    let offset = address.as_usize();
    Tag::decode(LittleEndian::read_u64(&bytes[offset..]))
}

/// ブロックのヘッダを書き込む.
pub fn write_header(bytes: &mut [u8], block: Address, tag: Tag) {
    write(bytes, block, tag);
}

/// ブロックのフッタを書き込む.
///
/// フッタの位置は`tag`のサイズから計算される.
pub fn write_footer(bytes: &mut [u8], block: Address, tag: Tag) {
    write(bytes, block + tag.size() - TAG_SIZE, tag);
}

/// ブロックのヘッダとフッタの両方を書き込む.
pub fn write_tags(bytes: &mut [u8], block: Address, tag: Tag) {
    write_header(bytes, block, tag);
    write_footer(bytes, block, tag);
}

/// ヘッダに記録されたサイズを用いて、ブロックのフッタの位置を返す.
pub fn footer_of(bytes: &[u8], block: Address) -> Address {
    block + read(bytes, block).size() - TAG_SIZE
}

/// ヘッダに記録されたサイズを用いて、後続ブロックのヘッダの位置を返す.
pub fn header_of_next(bytes: &[u8], block: Address) -> Address {
    block + read(bytes, block).size()
}

/// 先行ブロックのフッタの位置を返す.
///
/// 先頭ブロックの場合には、プロローグのヘッダ位置が返される.
pub fn footer_of_prev(block: Address) -> Address {
    block - TAG_SIZE
}

/// 先行ブロックのフッタに記録されたサイズを用いて、先行ブロックのヘッダの位置を返す.
pub fn header_of_prev(bytes: &[u8], block: Address) -> Address {
    block - read(bytes, footer_of_prev(block)).size()
}

/// ブロックのペイロードの開始位置を返す.
pub fn payload_of(block: Address) -> Address {
    block + TAG_SIZE
}

/// ペイロードの開始位置から、それを含むブロックの位置を返す.
pub fn block_of_payload(payload: Address) -> Address {
    payload - TAG_SIZE
}

fn write(bytes: &mut [u8], address: Address, tag: Tag) {
    let offset = address.as_usize();
    LittleEndian::write_u64(&mut bytes[offset..], tag.encode());
}
