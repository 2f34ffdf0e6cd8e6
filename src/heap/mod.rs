//! 境界タグ方式のヒープ.
//!
//! このモジュール自体は、具体的な記憶領域の確保処理とは切り離されており、
//! 使用する[Arena]実装を指定した上で動作させる.
//!
//! # ヒープの形式
//!
//! ```text
//! begin                                       end
//! arena                                     arena
//!  ----------------------------------------------
//! | hdr(8:a) | zero or more usr blks | hdr(0:a) |
//!  ----------------------------------------------
//! | prologue |                       | epilogue |
//! | block    |                       | block    |
//! ```
//!
//! 常に割当済みとなっているプロローグとエピローグによって、
//! 結合処理時に「隣接ブロックが存在するか」を確認する必要がなくなっている.
//!
//! 各ブロックの形式に関しては[block](../block/index.html)モジュールを、
//! 空きブロックの管理方法に関しては`FreeList`を参照のこと.
//!
//! [Arena]: ../arena/trait.Arena.html
use slog::Logger;
use std::cmp;

pub use self::address::Address;
pub use self::builder::{HeapBuilder, DEFAULT_CHUNK_SIZE};
pub use self::checker::{CheckMode, CheckReport, Violation};
pub use self::free_list::{SizeClass, CLASS_COUNT, EXACT_CLASS_COUNT};

use self::checker::Checker;
use self::free_list::FreeList;
use crate::arena::Arena;
use crate::block::{self, Tag, MIN_BLOCK_SIZE, OVERHEAD, TAG_SIZE};
use crate::metrics::HeapMetrics;
use crate::{ErrorKind, Result};

mod address;
mod builder;
mod checker;
mod free_list;

/// アリーナ上に構築されるヒープ.
///
/// 割当(`allocate`)・解放(`free`)・再割当(`reallocate`)の各操作を提供する.
/// 返されるアドレスは、アリーナ先頭からのオフセットで表現されたペイロードの位置であり、
/// ペイロードの内容には`payload`および`payload_mut`メソッド経由でアクセスする.
///
/// # 割当戦略
///
/// 空きブロックはサイズクラス毎のバケットで管理されている.
///
/// 新規割当要求が発行された際には、要求サイズが属するクラスから上位のクラスに向かって
/// バケットを探索し、最初に見つかった要求サイズ以上の空きブロックが選択される.
///
/// 選択された空きブロックは、その先頭から要求サイズ分だけが割り当てられ、
/// 余剰分が最小ブロックサイズ以上であれば、新たな空きブロックとしてフリーリストに戻される.
/// 余剰分がそれ未満の場合には、ブロック全体が割り当てられる.
///
/// 適合する空きブロックが存在しない場合には、アリーナの伸長を試みる.
///
/// # 注意
///
/// スレッドセーフではない.
/// 全ての更新操作は`&mut self`を要求するため、排他は利用側で保証する必要がある.
#[derive(Debug)]
pub struct Heap<A> {
    arena: A,
    free_list: FreeList,
    prologue: Address,
    epilogue: Address,
    chunk_size: u32,
    check_mode: CheckMode,
    verbose_check: bool,
    logger: Logger,
    metrics: HeapMetrics,
}
impl<A: Arena> Heap<A> {
    /// デフォルト設定で、新規にヒープを構築する.
    pub fn new(arena: A) -> Result<Self> {
        track!(HeapBuilder::new().build(arena))
    }

    /// ヒープのメトリクスを返す.
    pub fn metrics(&self) -> &HeapMetrics {
        &self.metrics
    }

    /// ヒープが使用しているアリーナへの参照を返す.
    pub fn arena(&self) -> &A {
        &self.arena
    }

    /// アリーナの伸長単位を返す.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// `size`バイト以上のペイロードを持つブロックを割り当てる.
    ///
    /// 返り値は、ペイロードの開始位置(アライメント単位の倍数)である.
    ///
    /// 以下の場合には`None`が返され、ヒープの状態は変更されない:
    ///
    /// - `size`が`0`
    /// - `size`がブロックの最大サイズを超える
    /// - 適合する空きブロックが無く、アリーナの伸長にも失敗した
    pub fn allocate(&mut self, size: u32) -> Option<Address> {
        if size == 0 {
            return None;
        }
        let asize = match block::adjusted_size(size) {
            Some(asize) => asize,
            None => {
                warn!(self.logger, "Too large allocation request"; "size" => size);
                self.metrics.nospace_failures.increment();
                return None;
            }
        };

        let block = match self.free_list.find_fit(self.arena.as_bytes(), asize) {
            Some(block) => block,
            None => self.extend(cmp::max(asize, self.chunk_size))?,
        };
        let allocated = self.place(block, asize);
        self.metrics.count_allocation(allocated);
        Some(block::payload_of(block))
    }

    /// `allocate`によって割り当てられたブロックを解放する.
    ///
    /// 解放されたブロックは、前後の空きブロックと結合された上でフリーリストに戻される.
    ///
    /// # Errors
    ///
    /// `payload`が割当済みブロックのペイロード位置を指していないことが検出された場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される (二重解放を含む).
    /// この場合、ヒープの状態は変更されない.
    ///
    /// この検出はタグの整合性に基づくベストエフォートなものであり、
    /// 偶然に割当済みブロックと同じ形式を持つ位置が渡された場合には検出できない.
    pub fn free(&mut self, payload: Address) -> Result<()> {
        let block = track!(self.allocated_block_of(payload))?;
        let bytes = self.arena.as_bytes_mut();
        let size = block::read(bytes, block).size();
        block::write_tags(bytes, block, Tag::free(size));
        self.free_list.insert(bytes, block);
        self.metrics.count_release(size);
        self.coalesce(block);
        Ok(())
    }

    /// 割当済みブロックのサイズを変更する.
    ///
    /// 新たに`size`バイトのブロックを割り当て、旧ブロックのペイロードの内容を
    /// (新旧のサイズの小さい方だけ)コピーした上で、旧ブロックを解放する.
    /// 旧ブロックに十分な容量がある場合でも、常に再配置が行われる.
    ///
    /// - 新しいブロックの割当に失敗した場合には`Ok(None)`が返され、旧ブロックはそのまま残される
    /// - `size`が`0`の場合には、旧ブロックを解放した上で`Ok(None)`が返される
    ///
    /// # Errors
    ///
    /// `payload`が割当済みブロックのペイロード位置を指していない場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn reallocate(&mut self, payload: Address, size: u32) -> Result<Option<Address>> {
        let block = track!(self.allocated_block_of(payload))?;
        if size == 0 {
            track!(self.free(payload))?;
            return Ok(None);
        }

        let old_len = block::read(self.arena.as_bytes(), block).size() - OVERHEAD;
        let new_payload = match self.allocate(size) {
            Some(new_payload) => new_payload,
            None => return Ok(None),
        };
        let len = cmp::min(size, old_len) as usize;
        let start = payload.as_usize();
        self.arena
            .as_bytes_mut()
            .copy_within(start..start + len, new_payload.as_usize());
        track!(self.free(payload))?;
        Ok(Some(new_payload))
    }

    /// 割当済みブロックのペイロードを返す.
    ///
    /// 返されるバイト列の長さは、割当時に要求したサイズ以上となる.
    ///
    /// # Errors
    ///
    /// `payload`が割当済みブロックのペイロード位置を指していない場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn payload(&self, payload: Address) -> Result<&[u8]> {
        let block = track!(self.allocated_block_of(payload))?;
        let bytes = self.arena.as_bytes();
        let len = (block::read(bytes, block).size() - OVERHEAD) as usize;
        Ok(&bytes[payload.as_usize()..][..len])
    }

    /// 割当済みブロックのペイロードを、変更可能な形で返す.
    ///
    /// # Errors
    ///
    /// `payload`が割当済みブロックのペイロード位置を指していない場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn payload_mut(&mut self, payload: Address) -> Result<&mut [u8]> {
        let block = track!(self.allocated_block_of(payload))?;
        let bytes = self.arena.as_bytes_mut();
        let len = (block::read(bytes, block).size() - OVERHEAD) as usize;
        Ok(&mut bytes[payload.as_usize()..][..len])
    }

    /// プロローグとエピローグを除く、全てのブロックを先頭から順に列挙する.
    pub fn blocks(&self) -> Blocks {
        Blocks {
            bytes: self.arena.as_bytes(),
            current: self.prologue + TAG_SIZE,
            end: self.epilogue,
        }
    }

    /// ヒープの整合性検査を行う.
    ///
    /// 検査の内容に関しては`Violation`を参照のこと.
    ///
    /// # Errors
    ///
    /// `CheckMode::Strict`が指定されている場合には、最初の違反を検出した時点で
    /// 種類が`ErrorKind::InconsistentState`のエラーが返される.
    /// `CheckMode::Lenient`の場合には、違反は全てログに出力された上で`CheckReport`に格納される.
    pub fn check(&self) -> Result<CheckReport> {
        let checker = Checker {
            bytes: self.arena.as_bytes(),
            free_list: &self.free_list,
            prologue: self.prologue,
            mode: self.check_mode,
            verbose: self.verbose_check,
            logger: &self.logger,
        };
        track!(checker.run())
    }

    /// 空きブロック`block`から、`asize`バイトを割り当てる.
    ///
    /// 実際に割り当てられたブロックのサイズを返す.
    fn place(&mut self, block: Address, asize: u32) -> u32 {
        let bytes = self.arena.as_bytes_mut();
        let size = block::read(bytes, block).size();
        debug_assert!(asize <= size, "asize={}, size={}", asize, size);

        self.free_list.remove(bytes, block);
        if size - asize >= MIN_BLOCK_SIZE {
            block::write_tags(bytes, block, Tag::allocated(asize));
            let rest = block + asize;
            block::write_tags(bytes, rest, Tag::free(size - asize));
            self.free_list.insert(bytes, rest);
            self.metrics.splits.increment();
            debug!(
                self.logger,
                "Free block split";
                "block" => block.as_u32(),
                "size" => size,
                "allocated" => asize
            );
            asize
        } else {
            block::write_tags(bytes, block, Tag::allocated(size));
            size
        }
    }

    /// 空きブロック`block`を、隣接する空きブロックと結合する.
    ///
    /// `block`はフリーリストに含まれている必要がある.
    /// 結合後のブロックの位置を返す.
    fn coalesce(&mut self, block: Address) -> Address {
        let bytes = self.arena.as_bytes_mut();
        let size = block::read(bytes, block).size();
        let prev_tag = block::read(bytes, block::footer_of_prev(block));
        let next = block::header_of_next(bytes, block);
        let next_tag = block::read(bytes, next);

        let (merged, merged_size) = match (prev_tag.is_allocated(), next_tag.is_allocated()) {
            (true, true) => return block,
            (true, false) => {
                self.free_list.remove(bytes, block);
                self.free_list.remove(bytes, next);
                (block, size + next_tag.size())
            }
            (false, true) => {
                let prev = block::header_of_prev(bytes, block);
                self.free_list.remove(bytes, block);
                self.free_list.remove(bytes, prev);
                (prev, prev_tag.size() + size)
            }
            (false, false) => {
                let prev = block::header_of_prev(bytes, block);
                self.free_list.remove(bytes, block);
                self.free_list.remove(bytes, prev);
                self.free_list.remove(bytes, next);
                (prev, prev_tag.size() + size + next_tag.size())
            }
        };
        block::write_tags(bytes, merged, Tag::free(merged_size));
        self.free_list.insert(bytes, merged);
        self.metrics.coalesces.increment();
        debug!(
            self.logger,
            "Free blocks coalesced";
            "block" => block.as_u32(),
            "merged" => merged.as_u32(),
            "size" => merged_size
        );
        merged
    }

    /// アリーナを`min_size`バイト以上伸長し、追加された領域を空きブロックとしてヒープに加える.
    ///
    /// 追加された空きブロックは、直前の空きブロックと結合された上でその位置が返される.
    /// アリーナの伸長に失敗した場合には`None`が返される.
    fn extend(&mut self, min_size: u32) -> Option<Address> {
        let size = block::ceil_align(min_size)?;
        let start = match self.arena.grow(size) {
            Ok(start) => start,
            Err(e) => {
                warn!(self.logger, "Cannot extend the arena: {}", e; "size" => size);
                self.metrics.nospace_failures.increment();
                return None;
            }
        };
        debug_assert_eq!(start, self.epilogue + TAG_SIZE);

        // 旧エピローグの位置が、新しい空きブロックのヘッダとなる
        let block = self.epilogue;
        let bytes = self.arena.as_bytes_mut();
        block::write_tags(bytes, block, Tag::free(size));
        self.epilogue = block + size;
        block::write_header(bytes, self.epilogue, Tag::allocated(0));
        self.free_list.insert(bytes, block);

        self.metrics.count_extension(size, self.arena.len());
        debug!(
            self.logger,
            "Arena extended";
            "size" => size,
            "arena_bytes" => self.arena.len()
        );
        Some(self.coalesce(block))
    }

    /// `payload`を含む割当済みブロックの位置を返す.
    ///
    /// タグの整合性を確認することで、不正なアドレスをベストエフォートで検出する.
    fn allocated_block_of(&self, payload: Address) -> Result<Address> {
        let first_payload = block::payload_of(self.prologue + TAG_SIZE);
        track_assert!(
            block::is_aligned(payload.as_u32()),
            ErrorKind::InvalidInput;
            payload
        );
        track_assert!(
            first_payload <= payload && payload < self.epilogue,
            ErrorKind::InvalidInput;
            payload
        );

        let bytes = self.arena.as_bytes();
        let block = block::block_of_payload(payload);
        let header = block::read(bytes, block);
        track_assert!(
            header.is_allocated(),
            ErrorKind::InvalidInput,
            "Not an allocated block (double free?): payload={}, header={}",
            payload,
            header
        );
        let size = header.size();
        track_assert!(
            MIN_BLOCK_SIZE <= size
                && block::is_aligned(size)
                && size <= self.epilogue.offset_from(block).unwrap_or(0),
            ErrorKind::InvalidInput;
            payload,
            header
        );
        let footer = block::read(bytes, block + size - TAG_SIZE);
        track_assert!(header == footer, ErrorKind::InvalidInput; payload, header, footer);
        Ok(block)
    }
}

/// ブロックの情報.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// ブロックの位置 (ヘッダの位置).
    pub address: Address,

    /// ブロックのサイズ (両端のタグを含む).
    pub size: u32,

    /// 割当済みかどうか.
    pub allocated: bool,
}
impl BlockInfo {
    /// ペイロードの開始位置を返す.
    pub fn payload(&self) -> Address {
        block::payload_of(self.address)
    }
}

/// ヒープ内のブロック列を先頭から順に辿るイテレータ.
///
/// ヘッダのサイズを用いて次のブロックに進むため、ヒープが破損している場合には、
/// 走査は途中で打ち切られる. (破損の検出には`Heap::check`を使用すること)
#[derive(Debug)]
pub struct Blocks<'a> {
    bytes: &'a [u8],
    current: Address,
    end: Address,
}
impl<'a> Iterator for Blocks<'a> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.end {
            return None;
        }
        let tag = block::read(self.bytes, self.current);
        if tag.size() == 0 || self.end.offset_from(self.current)? < tag.size() {
            self.current = self.end;
            return None;
        }
        let info = BlockInfo {
            address: self.current,
            size: tag.size(),
            allocated: tag.is_allocated(),
        };
        self.current = self.current + tag.size();
        Some(info)
    }
}
