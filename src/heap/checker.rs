//! ヒープの整合性検査.
//!
//! ブロック列をプロローグからエピローグまで辿り、さらに全てのバケットのリストを辿って、
//! 以下の不変条件を検証する:
//!
//! - プロローグは割当済みかつサイズが一タグ分、エピローグは割当済みかつサイズがゼロ
//! - 各ブロックのヘッダとフッタが一致している
//! - 各ブロックのサイズが最小ブロックサイズ以上で、ペイロードがアライメントされている
//! - 連続する二つの空きブロックが存在しない
//! - フリーリストに含まれるブロックは全て空きであり、サイズに対応するバケットに属している
//! - リストの前方リンクと後方リンクが一致している
//! - ブロック列上の空きブロックと、リストに含まれるブロックの集合が一致している
//!
//! 検査は割当・解放時には実行されず、明示的に呼び出された場合にのみ実行される.
use slog::Logger;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::free_list::{read_links, FreeList, SizeClass};
use super::Address;
use crate::block::{self, Tag, MIN_BLOCK_SIZE, TAG_SIZE};
use crate::{ErrorKind, Result};

/// 違反検出時の振る舞い.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// 全ての違反をログに出力した上で収集し、検査を継続する.
    Lenient,

    /// 最初の違反を検出した時点で、`ErrorKind::InconsistentState`エラーを返す.
    Strict,
}
impl Default for CheckMode {
    fn default() -> Self {
        CheckMode::Lenient
    }
}

/// 検出された不変条件の違反.
///
/// 各値は、違反箇所を特定するためのブロックの位置と、期待値・観測値を保持している.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// プロローグが不正.
    BadPrologue {
        /// プロローグの位置.
        address: Address,
        /// 観測されたタグ.
        observed: Tag,
    },

    /// エピローグが不正 (割当済みでない、あるいはアリーナの末尾に無い).
    BadEpilogue {
        /// エピローグの位置.
        address: Address,
        /// 観測されたタグ.
        observed: Tag,
    },

    /// ヘッダとフッタが一致していない.
    TagMismatch {
        /// ブロックの位置.
        address: Address,
        /// ヘッダのタグ.
        header: Tag,
        /// フッタのタグ.
        footer: Tag,
    },

    /// ブロックのサイズが不正 (最小ブロックサイズ未満、非アライメント、アリーナの範囲外).
    ///
    /// この違反が検出された場合、それ以降のブロック列は辿れないため、走査はそこで打ち切られる.
    BadSize {
        /// ブロックの位置.
        address: Address,
        /// 観測されたサイズ.
        size: u32,
    },

    /// ペイロードがアライメントされていない.
    Misaligned {
        /// ブロックの位置.
        address: Address,
    },

    /// 空きブロックが連続している.
    AdjacentFree {
        /// 後ろ側の空きブロックの位置.
        address: Address,
        /// 前側の空きブロックの位置.
        previous: Address,
    },

    /// 割当済みブロックがフリーリストに含まれている.
    AllocatedInFreeList {
        /// ブロックの位置.
        address: Address,
        /// ブロックが含まれていたバケット.
        class: SizeClass,
    },

    /// 空きブロックが、サイズに対応しないバケットに含まれている.
    WrongBucket {
        /// ブロックの位置.
        address: Address,
        /// サイズから計算されるバケット.
        expected: SizeClass,
        /// 実際に含まれていたバケット.
        observed: SizeClass,
    },

    /// 後方リンクが、リスト上の直前のブロックを指していない.
    BrokenLink {
        /// ブロックの位置.
        address: Address,
        /// 期待される後方リンク.
        expected: Option<Address>,
        /// 観測された後方リンク.
        observed: Option<Address>,
    },

    /// 同じブロックがフリーリスト内に複数回出現した (リンクの循環を含む).
    DuplicateInFreeList {
        /// ブロックの位置.
        address: Address,
    },

    /// ブロック列上の空きブロックが、どのバケットにも含まれていない.
    UnlistedFreeBlock {
        /// ブロックの位置.
        address: Address,
    },

    /// フリーリストに含まれているブロックが、ブロック列上に存在しない.
    StrayFreeListEntry {
        /// ブロックの位置.
        address: Address,
    },
}
impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Violation::BadPrologue { address, observed } => {
                write!(f, "{}: bad prologue {} (expected [8:a])", address, observed)
            }
            Violation::BadEpilogue { address, observed } => {
                write!(f, "{}: bad epilogue {} (expected [0:a])", address, observed)
            }
            Violation::TagMismatch {
                address,
                header,
                footer,
            } => write!(
                f,
                "{}: header {} does not match footer {}",
                address, header, footer
            ),
            Violation::BadSize { address, size } => {
                write!(f, "{}: bad block size {}", address, size)
            }
            Violation::Misaligned { address } => {
                write!(f, "{}: payload is not aligned", address)
            }
            Violation::AdjacentFree { address, previous } => write!(
                f,
                "{}: free block follows another free block at {}",
                address, previous
            ),
            Violation::AllocatedInFreeList { address, class } => write!(
                f,
                "{}: allocated block is in the free list {}",
                address, class
            ),
            Violation::WrongBucket {
                address,
                expected,
                observed,
            } => write!(
                f,
                "{}: block is in the free list {} (expected {})",
                address, observed, expected
            ),
            Violation::BrokenLink {
                address,
                expected,
                observed,
            } => write!(
                f,
                "{}: prev link is {:?} (expected {:?})",
                address, observed, expected
            ),
            Violation::DuplicateInFreeList { address } => {
                write!(f, "{}: block appears twice in the free lists", address)
            }
            Violation::UnlistedFreeBlock { address } => {
                write!(f, "{}: free block is not in any free list", address)
            }
            Violation::StrayFreeListEntry { address } => {
                write!(f, "{}: free list entry is not a block of the heap", address)
            }
        }
    }
}

/// 整合性検査の結果.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// 走査したブロックの数 (プロローグとエピローグを除く).
    pub blocks: usize,

    /// 走査したブロックの内、空きブロックの数.
    pub free_blocks: usize,

    /// フリーリストに含まれていたブロックの数.
    pub listed_blocks: usize,

    /// 検出された違反の一覧.
    pub violations: Vec<Violation>,
}
impl CheckReport {
    /// 違反が一つも検出されなかったかどうかを判定する.
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

pub(crate) struct Checker<'a> {
    pub bytes: &'a [u8],
    pub free_list: &'a FreeList,
    pub prologue: Address,
    pub mode: CheckMode,
    pub verbose: bool,
    pub logger: &'a Logger,
}
impl<'a> Checker<'a> {
    pub fn run(self) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        let chain = track!(self.check_chain(&mut report))?;
        track!(self.check_free_lists(&chain, &mut report))?;
        debug!(
            self.logger,
            "Heap check finished";
            "blocks" => report.blocks,
            "free_blocks" => report.free_blocks,
            "listed_blocks" => self.free_list.len(),
            "violations" => report.violations.len()
        );
        Ok(report)
    }

    fn check_chain(&self, report: &mut CheckReport) -> Result<Chain> {
        let mut chain = Chain::default();
        let len = self.bytes.len() as u32;

        let prologue = block::read(self.bytes, self.prologue);
        if self.verbose {
            debug!(self.logger, "{}: prologue {}", self.prologue, prologue);
        }
        if prologue != Tag::allocated(TAG_SIZE) {
            track!(self.report(
                report,
                Violation::BadPrologue {
                    address: self.prologue,
                    observed: prologue,
                }
            ))?;
        }

        let mut previous_free = None;
        let mut current = self.prologue + TAG_SIZE;
        while current.as_u32() + TAG_SIZE <= len {
            let header = block::read(self.bytes, current);
            if header.size() == 0 {
                if self.verbose {
                    debug!(self.logger, "{}: epilogue {}", current, header);
                }
                if header.is_free() || current.as_u32() + TAG_SIZE != len {
                    track!(self.report(
                        report,
                        Violation::BadEpilogue {
                            address: current,
                            observed: header,
                        }
                    ))?;
                }
                return Ok(chain);
            }

            let size = header.size();
            let fits = current
                .as_u32()
                .checked_add(size)
                .map_or(false, |end| end + TAG_SIZE <= len);
            if size < MIN_BLOCK_SIZE || !block::is_aligned(size) || !fits {
                track!(self.report(
                    report,
                    Violation::BadSize {
                        address: current,
                        size,
                    }
                ))?;
                return Ok(chain);
            }

            let footer = block::read(self.bytes, current + size - TAG_SIZE);
            if self.verbose {
                debug!(
                    self.logger,
                    "{}: header: {} footer: {}", current, header, footer
                );
            }
            if header != footer {
                track!(self.report(
                    report,
                    Violation::TagMismatch {
                        address: current,
                        header,
                        footer,
                    }
                ))?;
            }
            if !block::is_aligned(block::payload_of(current).as_u32()) {
                track!(self.report(report, Violation::Misaligned { address: current }))?;
            }

            report.blocks += 1;
            chain.blocks.insert(current);
            if header.is_free() {
                report.free_blocks += 1;
                chain.free_blocks.insert(current);
                if let Some(previous) = previous_free {
                    track!(self.report(
                        report,
                        Violation::AdjacentFree {
                            address: current,
                            previous,
                        }
                    ))?;
                }
                previous_free = Some(current);
            } else {
                previous_free = None;
            }
            current = current + size;
        }

        // エピローグに到達する前にアリーナの末尾を超えた
        let observed = if current.as_u32() + TAG_SIZE <= len {
            block::read(self.bytes, current)
        } else {
            Tag::free(0)
        };
        track!(self.report(
            report,
            Violation::BadEpilogue {
                address: current,
                observed,
            }
        ))?;
        Ok(chain)
    }

    fn check_free_lists(&self, chain: &Chain, report: &mut CheckReport) -> Result<()> {
        let mut listed = HashSet::new();
        for class in SizeClass::of(0).and_above() {
            let mut prev = None;
            for block in self.free_list.iter(self.bytes, class) {
                if !listed.insert(block) {
                    track!(self.report(report, Violation::DuplicateInFreeList { address: block }))?;
                    break;
                }
                report.listed_blocks += 1;

                // ブロック列上に存在しない位置や、割当済みブロックのリンクは信頼できないので、
                // このバケットの走査はここで打ち切る
                if !chain.blocks.contains(&block) {
                    track!(self.report(report, Violation::StrayFreeListEntry { address: block }))?;
                    break;
                }
                let tag = block::read(self.bytes, block);
                if tag.is_allocated() {
                    track!(self.report(
                        report,
                        Violation::AllocatedInFreeList {
                            address: block,
                            class,
                        }
                    ))?;
                    break;
                }

                let expected = SizeClass::of(tag.size());
                if expected != class {
                    track!(self.report(
                        report,
                        Violation::WrongBucket {
                            address: block,
                            expected,
                            observed: class,
                        }
                    ))?;
                }
                let links = read_links(self.bytes, block);
                if links.prev != prev {
                    track!(self.report(
                        report,
                        Violation::BrokenLink {
                            address: block,
                            expected: prev,
                            observed: links.prev,
                        }
                    ))?;
                }
                prev = Some(block);
            }
        }

        for &block in chain.free_blocks.iter().filter(|b| !listed.contains(*b)) {
            track!(self.report(report, Violation::UnlistedFreeBlock { address: block }))?;
        }
        Ok(())
    }

    fn report(&self, report: &mut CheckReport, violation: Violation) -> Result<()> {
        match self.mode {
            CheckMode::Strict => track_panic!(ErrorKind::InconsistentState, "{}", violation),
            CheckMode::Lenient => {
                warn!(self.logger, "Heap inconsistency: {}", violation);
                report.violations.push(violation);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Default)]
struct Chain {
    blocks: HashSet<Address>,
    free_blocks: BTreeSet<Address>,
}
