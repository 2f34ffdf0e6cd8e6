//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

/// [`Heap`]のメトリクス.
///
/// [`Heap`]: ../heap/struct.Heap.html
#[derive(Debug, Clone)]
pub struct HeapMetrics {
    pub(crate) arena_bytes: Gauge,
    pub(crate) allocated_blocks: Counter,
    pub(crate) allocated_bytes: Counter,
    pub(crate) released_blocks: Counter,
    pub(crate) released_bytes: Counter,
    pub(crate) inserted_free_blocks: Counter,
    pub(crate) removed_free_blocks: Counter,
    pub(crate) splits: Counter,
    pub(crate) coalesces: Counter,
    pub(crate) extensions: Counter,
    pub(crate) extended_bytes: Counter,
    pub(crate) nospace_failures: Counter,
}
impl HeapMetrics {
    /// アリーナの現在の大きさ.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_arena_bytes <GAUGE>
    /// ```
    pub fn arena_bytes(&self) -> u64 {
        self.arena_bytes.value() as u64
    }

    /// ブロックの割当回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_allocated_blocks_total <COUNTER>
    /// ```
    pub fn allocated_blocks(&self) -> u64 {
        self.allocated_blocks.value() as u64
    }

    /// これまでに割り当てたブロックのバイト数(タグを含む).
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_allocated_bytes_total <COUNTER>
    /// ```
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.value() as u64
    }

    /// ブロックの解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_released_blocks_total <COUNTER>
    /// ```
    pub fn released_blocks(&self) -> u64 {
        self.released_blocks.value() as u64
    }

    /// これまでに解放されたブロックのバイト数(タグを含む).
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_released_bytes_total <COUNTER>
    /// ```
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes.value() as u64
    }

    /// 割当済みブロックが占有しているバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_allocated_bytes_total - tagheap_heap_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_bytes();
        let inc = self.allocated_bytes();
        inc - dec
    }

    /// フリーリストに挿入されたブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_inserted_free_blocks_total <COUNTER>
    /// ```
    pub fn inserted_free_blocks(&self) -> u64 {
        self.inserted_free_blocks.value() as u64
    }

    /// フリーリストから削除されたブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_removed_free_blocks_total <COUNTER>
    /// ```
    pub fn removed_free_blocks(&self) -> u64 {
        self.removed_free_blocks.value() as u64
    }

    /// フリーリスト(全バケットの合計)の長さ.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_inserted_free_blocks_total - tagheap_heap_removed_free_blocks_total
    /// ```
    pub fn free_list_len(&self) -> usize {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.removed_free_blocks();
        let inc = self.inserted_free_blocks();
        (inc - dec) as usize
    }

    /// 割当時に空きブロックが分割された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_splits_total <COUNTER>
    /// ```
    pub fn splits(&self) -> u64 {
        self.splits.value() as u64
    }

    /// 隣接する空きブロック同士が結合された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_coalesces_total <COUNTER>
    /// ```
    pub fn coalesces(&self) -> u64 {
        self.coalesces.value() as u64
    }

    /// アリーナの伸長回数.
    ///
    /// 初期化時の伸長は含まない.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_extensions_total <COUNTER>
    /// ```
    pub fn extensions(&self) -> u64 {
        self.extensions.value() as u64
    }

    /// アリーナの伸長によって追加されたバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_extended_bytes_total <COUNTER>
    /// ```
    pub fn extended_bytes(&self) -> u64 {
        self.extended_bytes.value() as u64
    }

    /// 空き領域の不足によって割当に失敗した回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// tagheap_heap_nospace_failures_total <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("tagheap").subsystem("heap");
        HeapMetrics {
            arena_bytes: builder
                .gauge("arena_bytes")
                .help("Size of the arena")
                .finish()
                .expect("Never fails"),
            allocated_blocks: builder
                .counter("allocated_blocks_total")
                .help("Number of allocated blocks")
                .finish()
                .expect("Never fails"),
            allocated_bytes: builder
                .counter("allocated_bytes_total")
                .help("Number of allocated bytes")
                .finish()
                .expect("Never fails"),
            released_blocks: builder
                .counter("released_blocks_total")
                .help("Number of released blocks")
                .finish()
                .expect("Never fails"),
            released_bytes: builder
                .counter("released_bytes_total")
                .help("Number of released bytes")
                .finish()
                .expect("Never fails"),
            inserted_free_blocks: builder
                .counter("inserted_free_blocks_total")
                .help("Number of inserted blocks into free lists")
                .finish()
                .expect("Never fails"),
            removed_free_blocks: builder
                .counter("removed_free_blocks_total")
                .help("Number of removed blocks from free lists")
                .finish()
                .expect("Never fails"),
            splits: builder
                .counter("splits_total")
                .help("Number of free blocks split on allocation")
                .finish()
                .expect("Never fails"),
            coalesces: builder
                .counter("coalesces_total")
                .help("Number of merges of adjacent free blocks")
                .finish()
                .expect("Never fails"),
            extensions: builder
                .counter("extensions_total")
                .help("Number of arena extensions")
                .finish()
                .expect("Never fails"),
            extended_bytes: builder
                .counter("extended_bytes_total")
                .help("Number of bytes added by arena extensions")
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("nospace_failures_total")
                .help("Number of allocation failures caused by no available space")
                .finish()
                .expect("Never fails"),
        }
    }

    pub(crate) fn count_allocation(&self, size: u32) {
        self.allocated_blocks.increment();
        self.allocated_bytes.add_u64(u64::from(size));
    }

    pub(crate) fn count_release(&self, size: u32) {
        self.released_blocks.increment();
        self.released_bytes.add_u64(u64::from(size));
    }

    pub(crate) fn count_extension(&self, size: u32, arena_bytes: u32) {
        self.extensions.increment();
        self.extended_bytes.add_u64(u64::from(size));
        self.arena_bytes.set(f64::from(arena_bytes));
    }
}
