//! Offset/limit pagination over list actions.

use std::future::Future;

/// One page of a list action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Total number of matching items, when the API reports it.
    pub total: Option<u64>,
}

/// Fetches every page of a list action.
///
/// `fetch` receives the offset and limit of the page to load. Paging stops on
/// a short page, an empty page, or once the reported total is reached. A
/// `page_size` of zero is treated as one.
///
/// # Errors
///
/// Returns the first error reported by `fetch`.
pub async fn paginate<T, E, F, Fut>(page_size: u64, mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let limit = page_size.max(1);
    let mut offset = 0_u64;
    let mut items = Vec::new();

    loop {
        let page = fetch(offset, limit).await?;
        let received = u64::try_from(page.items.len()).unwrap_or(u64::MAX);
        items.extend(page.items);
        offset = offset.saturating_add(received);

        let short = received < limit;
        let complete = page.total.is_some_and(|total| offset >= total);
        if short || complete {
            return Ok(items);
        }
    }
}
