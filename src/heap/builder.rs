use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use super::checker::CheckMode;
use super::free_list::FreeList;
use super::Heap;
use crate::arena::Arena;
use crate::block::{self, Tag, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, TAG_SIZE};
use crate::metrics::HeapMetrics;
use crate::{ErrorKind, Result};

/// アリーナの伸長単位のデフォルト値(64KB).
pub const DEFAULT_CHUNK_SIZE: u32 = 1 << 16;

/// `Heap`のビルダ.
#[derive(Debug, Clone)]
pub struct HeapBuilder {
    chunk_size: u32,
    initial_size: Option<u32>,
    check_mode: CheckMode,
    verbose_check: bool,
    logger: Logger,
    metrics: MetricBuilder,
}
impl HeapBuilder {
    /// デフォルト設定で`HeapBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        HeapBuilder {
            chunk_size: DEFAULT_CHUNK_SIZE,
            initial_size: None,
            check_mode: CheckMode::default(),
            verbose_check: false,
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
        }
    }

    /// アリーナの伸長単位を設定する.
    ///
    /// 割当要求を満たす空きブロックが存在しない場合には、
    /// 要求サイズとこの値の大きい方の分だけアリーナが伸長される.
    ///
    /// 値はアライメント単位(8バイト)の倍数かつ最小ブロックサイズ以上である必要がある.
    /// そうではない値が指定された場合には、ヒープの構築時にエラーとなる.
    ///
    /// デフォルト値は`DEFAULT_CHUNK_SIZE`.
    pub fn chunk_size(&mut self, size: u32) -> &mut Self {
        self.chunk_size = size;
        self
    }

    /// ヒープ構築時に確保するアリーナの大きさを設定する.
    ///
    /// プロローグとエピローグの分を含むため、
    /// 最初の空きブロックのサイズは、この値からタグ二つ分を引いたものとなる.
    ///
    /// デフォルトでは`chunk_size`と同じ値が使われる.
    pub fn initial_size(&mut self, size: u32) -> &mut Self {
        self.initial_size = Some(size);
        self
    }

    /// 整合性検査の違反検出時の振る舞いを設定する.
    ///
    /// デフォルト値は`CheckMode::Lenient`.
    pub fn check_mode(&mut self, mode: CheckMode) -> &mut Self {
        self.check_mode = mode;
        self
    }

    /// 整合性検査時に、走査した全てのブロックをログ(debugレベル)に出力するかどうかを設定する.
    ///
    /// デフォルト値は`false`.
    pub fn verbose_check(&mut self, verbose: bool) -> &mut Self {
        self.verbose_check = verbose;
        self
    }

    /// ロガーを設定する.
    ///
    /// デフォルトでは、ログは全て破棄される.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// 空のアリーナ上にヒープを構築する.
    ///
    /// アリーナを初期サイズ分伸長した上で、以下の形式に初期化する:
    ///
    /// ```text
    ///  --------------------------------------------------
    /// | hdr(8:a) |      free block       | hdr(0:a) |
    ///  --------------------------------------------------
    /// | prologue |                       | epilogue |
    /// ```
    ///
    /// # Errors
    ///
    /// - 設定値が不正な場合や、アリーナが空ではない場合には、
    ///   種類が`ErrorKind::InvalidInput`のエラーが返される
    /// - 初期サイズ分の伸長ができない場合には、
    ///   種類が`ErrorKind::ArenaExhausted`のエラーが返される
    pub fn build<A: Arena>(&self, mut arena: A) -> Result<Heap<A>> {
        let initial_size = self.initial_size.unwrap_or(self.chunk_size);
        track!(validate_size(self.chunk_size, MIN_BLOCK_SIZE))?;
        track!(validate_size(initial_size, MIN_BLOCK_SIZE + 2 * TAG_SIZE))?;
        track_assert!(arena.is_empty(), ErrorKind::InvalidInput; arena.len());

        let prologue = track!(arena.grow(initial_size))?;
        let first = prologue + TAG_SIZE;
        let first_size = initial_size - 2 * TAG_SIZE;
        let epilogue = first + first_size;
        {
            let bytes = arena.as_bytes_mut();
            block::write_header(bytes, prologue, Tag::allocated(TAG_SIZE));
            block::write_tags(bytes, first, Tag::free(first_size));
            block::write_header(bytes, epilogue, Tag::allocated(0));
        }

        let metrics = HeapMetrics::new(&self.metrics);
        metrics.arena_bytes.set(f64::from(arena.len()));
        let mut free_list = FreeList::new(metrics.clone());
        free_list.insert(arena.as_bytes_mut(), first);

        info!(
            self.logger,
            "Heap created";
            "initial_size" => initial_size,
            "chunk_size" => self.chunk_size
        );
        Ok(Heap {
            arena,
            free_list,
            prologue,
            epilogue,
            chunk_size: self.chunk_size,
            check_mode: self.check_mode,
            verbose_check: self.verbose_check,
            logger: self.logger.clone(),
            metrics,
        })
    }
}
impl Default for HeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_size(size: u32, min: u32) -> Result<()> {
    track_assert!(block::is_aligned(size), ErrorKind::InvalidInput; size);
    track_assert!(min <= size, ErrorKind::InvalidInput; size, min);
    track_assert!(size <= MAX_BLOCK_SIZE, ErrorKind::InvalidInput; size);
    Ok(())
}
