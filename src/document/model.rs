use std::collections::HashSet;
use std::sync::Arc;

use crate::document::page::{EditData, PageId, PageInfo, SourceFile};
use crate::error::{AppError, AppResult};

/// Ordered pages of an edit session.
///
/// `original` mirrors the opened files and never changes. The working list is
/// created on the first edit; from then on it is what [`DocumentModel::pages`]
/// returns and `has_changes` stays true.
#[derive(Debug, Clone)]
pub struct DocumentModel {
    files: Vec<Arc<SourceFile>>,
    original: Vec<PageInfo>,
    current: Option<Vec<PageInfo>>,
}

impl DocumentModel {
    pub fn new(files: Vec<Arc<SourceFile>>) -> Self {
        let mut original = Vec::new();
        for file in &files {
            for index_in_file in 0..file.page_count() {
                let global_index = original.len();
                original.push(PageInfo::from_source(
                    Arc::clone(file),
                    index_in_file,
                    global_index,
                ));
            }
        }
        Self {
            files,
            original,
            current: None,
        }
    }

    pub fn files(&self) -> &[Arc<SourceFile>] {
        &self.files
    }

    pub fn is_multi_file(&self) -> bool {
        self.files.len() > 1
    }

    pub fn has_changes(&self) -> bool {
        self.current.is_some()
    }

    pub fn pages(&self) -> &[PageInfo] {
        self.current.as_deref().unwrap_or(&self.original)
    }

    pub fn original_pages(&self) -> &[PageInfo] {
        &self.original
    }

    pub fn len(&self) -> usize {
        self.pages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages().is_empty()
    }

    pub fn page(&self, index: usize) -> AppResult<&PageInfo> {
        let pages = self.pages();
        pages
            .get(index)
            .ok_or_else(|| AppError::out_of_range(index, pages.len()))
    }

    pub fn index_of(&self, id: PageId) -> Option<usize> {
        self.pages().iter().position(|page| page.id() == id)
    }

    pub fn add_page(&mut self, edit: EditData) -> &PageInfo {
        let pages = self.working_pages();
        let index = pages.len();
        pages.push(PageInfo::inserted(edit, index));
        &pages[index]
    }

    pub fn remove_page(&mut self, index: usize) -> AppResult<PageInfo> {
        let len = self.len();
        if len == 1 {
            return Err(AppError::LastPageCannotBeRemoved);
        }
        if index >= len {
            return Err(AppError::out_of_range(index, len));
        }
        let pages = self.working_pages();
        let removed = pages.remove(index);
        reindex(pages);
        Ok(removed)
    }

    pub fn move_page(&mut self, from: usize, to: usize) -> AppResult<()> {
        let len = self.len();
        for index in [from, to] {
            if index >= len {
                return Err(AppError::out_of_range(index, len));
            }
        }
        let pages = self.working_pages();
        let page = pages.remove(from);
        pages.insert(to, page);
        reindex(pages);
        Ok(())
    }

    /// Replaces the working list with the pages named by `ids`, in that order.
    /// Pages left out are dropped. An empty list leaves everything untouched.
    pub fn reorder(&mut self, ids: &[PageId]) -> AppResult<()> {
        let available = self.len();
        if ids.len() > available {
            return Err(AppError::NewOrderCapacityMoreThanInitial {
                requested: ids.len(),
                available,
            });
        }
        if ids.is_empty() {
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let mut reordered = Vec::with_capacity(ids.len());
        for &id in ids {
            if !seen.insert(id) {
                return Err(AppError::invalid_argument(format!(
                    "page {id} appears more than once in the new order"
                )));
            }
            let page = self
                .pages()
                .iter()
                .find(|page| page.id() == id)
                .ok_or(AppError::PageNotFound(id))?;
            reordered.push(page.clone());
        }

        reindex(&mut reordered);
        self.current = Some(reordered);
        Ok(())
    }

    /// Stores an updated copy of the page at `index`. The id must match.
    pub fn set_page(&mut self, index: usize, page: PageInfo) -> AppResult<()> {
        let existing = self.page(index)?;
        if existing.id() != page.id() {
            return Err(AppError::invalid_argument(format!(
                "page {} cannot replace page {} at index {index}",
                page.id(),
                existing.id()
            )));
        }
        let pages = self.working_pages();
        pages[index] = page.with_global_index(index);
        Ok(())
    }

    fn working_pages(&mut self) -> &mut Vec<PageInfo> {
        let original = &self.original;
        self.current.get_or_insert_with(|| original.clone())
    }
}

fn reindex(pages: &mut [PageInfo]) {
    for (index, page) in pages.iter_mut().enumerate() {
        if page.global_index() != index {
            *page = page.with_global_index(index);
        }
    }
}
