use serde::{Deserialize, Serialize};

use super::UnreadableDocumentError;

/// A run of text placed on a page.
///
/// `y` is measured top-down from the upper edge of the page so that sorting
/// by `(page, y, x)` gives reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// All fragments of one page, in content-stream order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub fragments: Vec<TextFragment>,
}

pub type PageResult = Result<PageText, UnreadableDocumentError>;

/// Lazy page-by-page access to the text of an opened document.
///
/// Each call to `pages()` starts a fresh pass from the first page; a page is
/// decoded only when the iterator reaches it.
pub trait TextSource {
    fn page_count(&self) -> usize;

    fn pages(&self) -> Box<dyn Iterator<Item = PageResult> + '_>;

    /// Flattened view over `pages()`. A page that fails to decode yields a
    /// single `Err` in place of its fragments.
    fn fragments(
        &self,
    ) -> Box<dyn Iterator<Item = Result<TextFragment, UnreadableDocumentError>> + '_> {
        Box::new(self.pages().flat_map(|page| match page {
            Ok(page) => page.fragments.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        }))
    }
}
