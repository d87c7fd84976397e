//! Abstractions for page-based pagination.

/// Arguments of a page request.
#[derive(Clone, Copy, Debug)]
pub struct Arguments {
    /// 1-based number of the requested page.
    page: u32,

    /// Maximum number of items on the requested page.
    limit: u32,
}

impl Arguments {
    /// Default [`Arguments::limit`] applied when none is requested.
    pub const DEFAULT_LIMIT: u32 = 10;

    /// Highest [`Arguments::limit`] a single request may ask for.
    pub const MAX_LIMIT: u32 = 100;

    /// Creates new [`Arguments`], clamping the provided values into their
    /// allowed ranges.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Returns the 1-based number of the requested page.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Returns the maximum number of items on the requested page.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the number of items to skip before the requested page starts.
    #[must_use]
    pub fn offset(&self) -> usize {
        let page = usize::try_from(self.page).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        (page - 1).saturating_mul(limit)
    }
}

impl Default for Arguments {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A single page of `I`tems along with its [`Meta`] information.
#[derive(Clone, Debug)]
pub struct Page<I> {
    /// Items of this [`Page`].
    pub items: Vec<I>,

    /// [`Meta`] information of this [`Page`].
    pub meta: Meta,
}

impl<I> Page<I> {
    /// Creates a new [`Page`] from the `items` selected by the provided
    /// [`Arguments`] out of `total` matching ones.
    #[must_use]
    pub fn new(args: Arguments, items: Vec<I>, total: usize) -> Self {
        let limit = usize::try_from(args.limit()).unwrap_or(usize::MAX);
        let meta = Meta {
            current_page: args.page(),
            total_pages: u32::try_from(total.div_ceil(limit))
                .unwrap_or(u32::MAX),
            total,
            has_more: args.offset() + items.len() < total,
            limit: args.limit(),
        };
        Self { items, meta }
    }
}

/// Meta information about a [`Page`].
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Meta {
    /// 1-based number of the current [`Page`].
    pub current_page: u32,

    /// Total number of [`Page`]s matching the request.
    pub total_pages: u32,

    /// Total number of items matching the request.
    pub total: usize,

    /// Indicator whether more items follow the current [`Page`].
    pub has_more: bool,

    /// Maximum number of items on a [`Page`].
    pub limit: u32,
}

#[cfg(test)]
mod spec {
    use super::{Arguments, Page};

    #[test]
    fn clamps_arguments() {
        let args = Arguments::new(Some(0), Some(0));
        assert_eq!(args.page(), 1);
        assert_eq!(args.limit(), 1);

        let args = Arguments::new(None, Some(100_000));
        assert_eq!(args.limit(), Arguments::MAX_LIMIT);
    }

    #[test]
    fn computes_meta() {
        let args = Arguments::new(Some(2), Some(3));
        assert_eq!(args.offset(), 3);

        let page = Page::new(args, vec![4, 5, 6], 7);
        assert_eq!(page.meta.current_page, 2);
        assert_eq!(page.meta.total_pages, 3);
        assert_eq!(page.meta.total, 7);
        assert!(page.meta.has_more);

        let last = Page::new(Arguments::new(Some(3), Some(3)), vec![7], 7);
        assert!(!last.meta.has_more);
    }
}
