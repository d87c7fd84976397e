//! [`Product`] read model definition.
//!
//! [`Product`]: crate::domain::Product

pub mod list {
    //! [`Product`]s list definitions.

    use common::pagination;

    use crate::domain::product;
    #[cfg(doc)]
    use crate::domain::Product;

    /// Selector of a [`Product`]s list page.
    #[derive(Clone, Debug)]
    pub struct Selector {
        /// [`Filter`] to narrow the list with.
        pub filter: Filter,

        /// Pagination [`pagination::Arguments`] of the requested page.
        pub page: pagination::Arguments,
    }

    /// Filter of a [`Product`]s list.
    #[derive(Clone, Debug, Default)]
    pub struct Filter {
        /// Free-text term to fuzzy search [`Product`] names and categories
        /// for.
        pub search: Option<String>,

        /// Exact [`product::Category`] to select.
        pub category: Option<product::Category>,
    }

    impl Filter {
        /// Creates a new [`Filter`] sanitizing the provided free-text
        /// `search` term.
        ///
        /// The term is lowercased and stripped of everything but letters,
        /// digits and spaces; an empty result is treated as no term at all.
        #[must_use]
        pub fn new(
            search: Option<&str>,
            category: Option<product::Category>,
        ) -> Self {
            let search = search
                .map(|term| {
                    term.to_lowercase()
                        .chars()
                        .filter(|c| c.is_alphanumeric() || *c == ' ')
                        .collect::<String>()
                })
                .filter(|term| !term.trim().is_empty());
            Self { search, category }
        }
    }

    #[cfg(test)]
    mod spec {
        use super::Filter;

        #[test]
        fn sanitizes_search_term() {
            let filter = Filter::new(Some("Wi-Fi! rout3r$"), None);
            assert_eq!(filter.search.as_deref(), Some("wifi rout3r"));

            let filter = Filter::new(Some("!!!"), None);
            assert_eq!(filter.search, None);
        }
    }
}
