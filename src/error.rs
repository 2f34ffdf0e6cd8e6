/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// アリーナをこれ以上拡張できない.
    ///
    /// アリーナの背後にある記憶領域が枯渇していることを示している.
    /// ヒープの割当操作(e.g., `Heap::allocate`)は、このエラーを`None`に変換して返すため、
    /// 利用者がこの種別を直接目にするのは`Arena::grow`やヒープの構築時に限られる.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が不要な領域を解放する
    /// - アリーナの容量を増やした上で、ヒープを作り直す
    ArenaExhausted,

    /// 入力が不正.
    ///
    /// 割当済みではないアドレスの解放(二重解放を含む)の検出や、
    /// ビルダに不正な設定値が渡された場合等に、このエラーが返される.
    ///
    /// なお、不正なアドレスの検出はベストエフォートであり、
    /// 全ての誤用が検出されることは保証されない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// 内部状態が不整合に陥っている.
    ///
    /// 厳格モードの整合性検査が違反を検出した場合に返される.
    /// プログラムにバグがあるか、ヒープの内容が外部から破壊されたことを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    InconsistentState,

    /// その他エラー.
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
