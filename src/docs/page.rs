use crate::docs::locate::normalize;

/// One page of extracted text. Immutable once built; the normalized form is
/// computed eagerly because every citation lookup reads it.
#[derive(Debug, Clone)]
pub struct Page {
    number: u32,
    text: String,
    norm: String,
}

impl Page {
    fn new(number: u32, text: String) -> Self {
        let norm = normalize(&text);
        Self { number, text, norm }
    }

    /// 1-based page number within the document.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whitespace-collapsed, lowercased, de-hyphenated text used for
    /// matching.
    pub fn norm(&self) -> &str {
        &self.norm
    }
}

/// An uploaded file's page-indexed text corpus. Lives in the owner's session
/// until `/reset` or process exit.
#[derive(Debug, Clone)]
pub struct Document {
    filename: String,
    pages: Vec<Page>,
}

impl Document {
    pub fn new(filename: impl Into<String>, page_texts: Vec<String>) -> Self {
        let pages = page_texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page::new(i as u32 + 1, text))
            .collect();
        Self { filename: filename.into(), pages }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Total normalized characters across all pages. Used by the extraction
    /// preflight to decide whether a PDF is image-only.
    pub fn norm_char_count(&self) -> usize {
        self.pages.iter().map(|p| p.norm().chars().count()).sum()
    }
}
