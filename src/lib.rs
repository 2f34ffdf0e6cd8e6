//! Boundary-tag heap allocator.
//!
//! `tagheap`は、単一の伸長可能な線形領域(アリーナ)を管理する、汎用の動的メモリアロケータ.
//!
//! # 特徴
//!
//! - 各ブロックの両端に同一のタグ(割当フラグとサイズ)を置く"境界タグ"方式を採用
//!   - 解放時には前後の隣接ブロックを定数時間で参照して結合(coalesce)できる
//!   - 連続する二つの空きブロックは存在しない、という不変条件が常に維持される
//! - 空きブロックはサイズクラス毎のバケット(双方向リンクリスト)で管理される
//!   - 小さいサイズは8バイト単位の厳密なクラス、大きいサイズは2の冪単位のクラス
//! - 割当時には要求サイズのクラスから上位のクラスに向かって"FirstFit"で探索を行う
//!   - 余剰分が最小ブロックサイズ以上であれば分割し、それ未満であれば丸ごと割り当てる
//! - 適合するブロックが無い場合には[Arena]を拡張する
//!   - アリーナは伸長のみを行い、縮小や再配置は行わない
//! - 整合性検査器(checker)によって、ブロック列とフリーリストの不変条件を検証可能
//! - スレッドセーフではない (排他は`&mut self`によって静的に保証される)
//!
//! # モジュールの依存関係
//!
//! ```text
//! heap => block => arena
//! ```
//!
//! - [heap]モジュール:
//!   - 主に[Heap]構造体を提供
//!   - `tagheap`の利用者が直接触るのはこの構造体
//!   - 割当・解放・再割当、フリーリスト、整合性検査を担当する
//! - [block]モジュール:
//!   - ブロックのタグのエンコード・デコードと、境界位置の計算を担当する
//! - [arena]モジュール:
//!   - 主に[Arena]トレイトとその実装である[MemoryArena]を提供
//!   - [heap]に対して伸長可能なバイト列を提供するのが目的
//!
//! [heap]: ./heap/index.html
//! [Heap]: ./heap/struct.Heap.html
//! [block]: ./block/index.html
//! [arena]: ./arena/index.html
//! [Arena]: ./arena/trait.Arena.html
//! [MemoryArena]: ./arena/struct.MemoryArena.html
#![warn(missing_docs)]
extern crate byteorder;
extern crate prometrics;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

pub mod arena;
pub mod block;
pub mod heap;
pub mod metrics;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
