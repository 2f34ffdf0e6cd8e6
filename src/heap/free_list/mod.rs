//! 空きブロック用のフリーリスト.
//!
//! 空きブロックはサイズクラス毎のバケットに分類され、各バケットは順序を持たない双方向リンクリストとなる.
//!
//! リンク(`next`と`prev`)は、空きブロックのペイロード先頭の16バイトに格納される:
//!
//! ```text
//!  -----------------------------------------------------------
//! | header(8) | next(8) | prev(8) |   (unused)   | footer(8) |
//!  -----------------------------------------------------------
//! ```
//!
//! リンクの読み書きは、このモジュールの`insert`と`remove`のみが行う.
//! ブロックが割り当てられると、同じ領域は利用者のペイロードとなるため、
//! リンクは空きブロックに対してのみ意味を持つ.
use byteorder::{ByteOrder, LittleEndian};

pub use self::size_class::{SizeClass, CLASS_COUNT, EXACT_CLASS_COUNT};

use crate::block::{self, TAG_SIZE};
use crate::heap::Address;
use crate::metrics::HeapMetrics;

mod size_class;

const NIL: u64 = u64::max_value();

/// 空きブロックが保持するリンクの組.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Links {
    /// 同じバケット内の次のブロック.
    pub next: Option<Address>,

    /// 同じバケット内の前のブロック.
    pub prev: Option<Address>,
}

/// サイズクラス毎に分類されたフリーリスト群.
///
/// 各バケットの先頭位置は`heads`テーブル自体に保持されており、
/// 先頭要素の挿入・削除は、常にこのテーブルに直接反映される.
#[derive(Debug)]
pub(crate) struct FreeList {
    heads: [Option<Address>; CLASS_COUNT],
    len: usize,
    metrics: HeapMetrics,
}
impl FreeList {
    pub fn new(metrics: HeapMetrics) -> Self {
        FreeList {
            heads: [None; CLASS_COUNT],
            len: 0,
            metrics,
        }
    }

    /// リストに含まれている空きブロックの総数を返す.
    pub fn len(&self) -> usize {
        self.len
    }

    /// 指定クラスのバケットの先頭ブロックを返す.
    pub fn head(&self, class: SizeClass) -> Option<Address> {
        self.heads[class.as_usize()]
    }

    /// 指定クラスのバケットに含まれるブロックを、リンクを辿る順に列挙する.
    ///
    /// リンクが循環している場合には列挙が終わらないので、呼び出し側で打ち切る必要がある.
    pub fn iter<'a>(&self, bytes: &'a [u8], class: SizeClass) -> Iter<'a> {
        Iter {
            bytes,
            next: self.head(class),
            last: None,
        }
    }

    /// 空きブロックを、そのサイズに対応するバケットの先頭に追加する.
    ///
    /// # 事前条件
    ///
    /// - `block`のタグは空きを示している
    /// - `block`はいずれのバケットにも含まれていない
    pub fn insert(&mut self, bytes: &mut [u8], block: Address) {
        let tag = block::read(bytes, block);
        debug_assert!(tag.is_free(), "{:?}: {}", block, tag);

        let head = &mut self.heads[SizeClass::of(tag.size()).as_usize()];
        if let Some(old_head) = *head {
            let mut links = read_links(bytes, old_head);
            links.prev = Some(block);
            write_links(bytes, old_head, links);
        }
        let links = Links {
            next: *head,
            prev: None,
        };
        write_links(bytes, block, links);
        *head = Some(block);

        self.len += 1;
        self.metrics.inserted_free_blocks.increment();
    }

    /// 空きブロックを、そのサイズに対応するバケットから取り除く.
    ///
    /// # 事前条件
    ///
    /// - `block`は、現在のタグのサイズから計算されるバケットに含まれている
    pub fn remove(&mut self, bytes: &mut [u8], block: Address) {
        let tag = block::read(bytes, block);
        debug_assert!(tag.is_free(), "{:?}: {}", block, tag);

        let links = read_links(bytes, block);
        match links.prev {
            Some(prev) => {
                let mut prev_links = read_links(bytes, prev);
                prev_links.next = links.next;
                write_links(bytes, prev, prev_links);
            }
            None => {
                let head = &mut self.heads[SizeClass::of(tag.size()).as_usize()];
                debug_assert_eq!(*head, Some(block));
                *head = links.next;
            }
        }
        if let Some(next) = links.next {
            let mut next_links = read_links(bytes, next);
            next_links.prev = links.prev;
            write_links(bytes, next, next_links);
        }
        write_links(
            bytes,
            block,
            Links {
                next: None,
                prev: None,
            },
        );

        self.len -= 1;
        self.metrics.removed_free_blocks.increment();
    }

    /// `min_size`バイト以上の空きブロックを探す.
    ///
    /// `min_size`が属するクラスから上位のクラスに向かって順に探索を行い、
    /// 各バケット内では最初に見つかった条件を満たすブロックを採用する.
    ///
    /// バケットが空でなくとも条件を満たすブロックが無い場合には、次のクラスの探索に進む.
    /// 全てのクラスを探索し終えても見つからない場合には`None`が返される.
    pub fn find_fit(&self, bytes: &[u8], min_size: u32) -> Option<Address> {
        SizeClass::of(min_size)
            .and_above()
            .filter(|&class| self.head(class).is_some())
            .filter_map(|class| {
                self.iter(bytes, class)
                    .find(|&block| block::read(bytes, block).size() >= min_size)
            })
            .next()
    }
}

/// バケット内のブロックを列挙するためのイテレータ.
///
/// 各ブロックのリンクは、次の要素が要求された時点で初めて読み込まれる.
#[derive(Debug)]
pub struct Iter<'a> {
    bytes: &'a [u8],
    next: Option<Address>,
    last: Option<Address>,
}
impl<'a> Iterator for Iter<'a> {
    type Item = Address;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(last) = self.last.take() {
            self.next = read_links(self.bytes, last).next;
        }
        let block = self.next.take()?;
        self.last = Some(block);
        Some(block)
    }
}

/// 空きブロックのリンクを読み込む.
pub(crate) fn read_links(bytes: &[u8], block: Address) -> Links {
    let offset = block::payload_of(block).as_usize();
    Links {
        next: decode_link(LittleEndian::read_u64(&bytes[offset..])),
        prev: decode_link(LittleEndian::read_u64(&bytes[offset + TAG_SIZE as usize..])),
    }
}

fn write_links(bytes: &mut [u8], block: Address, links: Links) {
    let offset = block::payload_of(block).as_usize();
    LittleEndian::write_u64(&mut bytes[offset..], encode_link(links.next));
    LittleEndian::write_u64(
        &mut bytes[offset + TAG_SIZE as usize..],
        encode_link(links.prev),
    );
}

fn encode_link(link: Option<Address>) -> u64 {
    link.map_or(NIL, |a| u64::from(a.as_u32()))
}

fn decode_link(word: u64) -> Option<Address> {
    if word == NIL {
        None
    } else {
        Address::from_u32(word as u32)
    }
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;

    use super::*;
    use crate::block::Tag;

    fn setup(blocks: &[(u16, u32)]) -> (Vec<u8>, FreeList) {
        let mut bytes = vec![0; 4096];
        for &(start, size) in blocks {
            block::write_tags(&mut bytes, Address::from(start), Tag::free(size));
        }
        let list = FreeList::new(HeapMetrics::new(&MetricBuilder::new()));
        (bytes, list)
    }

    fn listed(list: &FreeList, bytes: &[u8], size: u32) -> Vec<Address> {
        list.iter(bytes, SizeClass::of(size)).collect()
    }

    #[test]
    fn insert_pushes_to_front() {
        let (mut bytes, mut list) = setup(&[(8, 32), (40, 32), (72, 32), (104, 48)]);
        list.insert(&mut bytes, Address::from(8));
        list.insert(&mut bytes, Address::from(40));
        list.insert(&mut bytes, Address::from(72));
        list.insert(&mut bytes, Address::from(104));

        assert_eq!(list.len(), 4);
        assert_eq!(
            listed(&list, &bytes, 32),
            vec![Address::from(72), Address::from(40), Address::from(8)]
        );
        assert_eq!(listed(&list, &bytes, 48), vec![Address::from(104)]);
        assert_eq!(
            read_links(&bytes, Address::from(40)),
            Links {
                next: Some(Address::from(8)),
                prev: Some(Address::from(72)),
            }
        );
        assert_eq!(list.metrics.free_list_len(), 4);
    }

    #[test]
    fn remove_head_updates_bucket() {
        let (mut bytes, mut list) = setup(&[(8, 32), (40, 32), (72, 32)]);
        for &start in &[8, 40, 72] {
            list.insert(&mut bytes, Address::from(start));
        }

        // 先頭
        list.remove(&mut bytes, Address::from(72));
        assert_eq!(list.head(SizeClass::of(32)), Some(Address::from(40)));
        assert_eq!(read_links(&bytes, Address::from(40)).prev, None);
        assert_eq!(
            listed(&list, &bytes, 32),
            vec![Address::from(40), Address::from(8)]
        );

        // 末尾
        list.remove(&mut bytes, Address::from(8));
        assert_eq!(listed(&list, &bytes, 32), vec![Address::from(40)]);
        assert_eq!(read_links(&bytes, Address::from(40)).next, None);

        // 唯一の要素
        list.remove(&mut bytes, Address::from(40));
        assert_eq!(list.head(SizeClass::of(32)), None);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn remove_middle() {
        let (mut bytes, mut list) = setup(&[(8, 32), (40, 32), (72, 32)]);
        for &start in &[8, 40, 72] {
            list.insert(&mut bytes, Address::from(start));
        }
        list.remove(&mut bytes, Address::from(40));
        assert_eq!(
            listed(&list, &bytes, 32),
            vec![Address::from(72), Address::from(8)]
        );
        assert_eq!(
            read_links(&bytes, Address::from(8)).prev,
            Some(Address::from(72))
        );
        assert_eq!(list.metrics.removed_free_blocks(), 1);
    }

    #[test]
    fn find_fit_searches_upward() {
        let (mut bytes, mut list) = setup(&[(8, 32), (40, 2048)]);
        list.insert(&mut bytes, Address::from(8));
        list.insert(&mut bytes, Address::from(40));

        assert_eq!(list.find_fit(&bytes, 32), Some(Address::from(8)));
        assert_eq!(list.find_fit(&bytes, 40), Some(Address::from(40)));
        assert_eq!(list.find_fit(&bytes, 2048), Some(Address::from(40)));
        assert_eq!(list.find_fit(&bytes, 2056), None);
    }

    #[test]
    fn find_fit_continues_past_non_matching_bucket() {
        // 1024と1536は同じクラス(#65)に属する
        let (mut bytes, mut list) = setup(&[(8, 1024), (1032, 2048)]);
        assert_eq!(SizeClass::of(1024), SizeClass::of(1536));
        list.insert(&mut bytes, Address::from(8));
        list.insert(&mut bytes, Address::from(1032));

        assert_eq!(list.find_fit(&bytes, 1536), Some(Address::from(1032)));
        assert_eq!(list.find_fit(&bytes, 1024), Some(Address::from(8)));
    }

    #[test]
    fn find_fit_scans_within_bucket() {
        let (mut bytes, mut list) = setup(&[(8, 1024), (1032, 1536)]);
        list.insert(&mut bytes, Address::from(1032));
        list.insert(&mut bytes, Address::from(8));

        // 先頭(1024)は条件を満たさないが、同じバケット内の後続要素は満たす
        assert_eq!(
            listed(&list, &bytes, 1024),
            vec![Address::from(8), Address::from(1032)]
        );
        assert_eq!(list.find_fit(&bytes, 1100), Some(Address::from(1032)));
    }
}
