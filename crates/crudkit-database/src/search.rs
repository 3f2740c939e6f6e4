//! Count-plus-page search over one table.

use tracing::debug;

use crudkit_core::result::AppResult;
use crudkit_core::types::{Condition, PageRequest, Record, SearchInput, SearchQuery, SearchResult};
use crudkit_entity::EntityMetadata;

use crate::backend::Session;

/// Apply the filters, sort and page of `input` on top of `query` and run a
/// count plus a page fetch.
///
/// The page size bound is enforced by the caller ([`SearchInput::validate`]);
/// zero pages or page sizes are still rejected here. Sort keys in `input`
/// replace the query's own ordering and must name filterable fields.
pub async fn search(
    session: &mut dyn Session,
    meta: &EntityMetadata,
    input: &SearchInput,
    query: SearchQuery,
) -> AppResult<SearchResult<Record>> {
    let page = PageRequest::bounded(input.page, input.page_size, u64::MAX)?;

    let mut condition = query.condition;
    for filter in &input.filters {
        condition = condition.and(Condition::Compare(filter.clone()));
    }
    meta.check_filterable(condition.fields())?;

    let sort = if input.sort.is_empty() {
        query.sort
    } else {
        input.sort.clone()
    };
    meta.check_filterable(sort.iter().map(|s| s.field.as_str()))?;

    let total = session.count(meta, &condition).await?;
    let scoped = SearchQuery {
        condition,
        relations: query.relations,
        sort,
        pagination: Some(page),
    };
    let items = session.fetch(meta, &scoped).await?;

    debug!(
        table = meta.table,
        total,
        page = page.page,
        page_size = page.page_size,
        returned = items.len(),
        "Search completed"
    );
    Ok(SearchResult::new(items, &page, total))
}
