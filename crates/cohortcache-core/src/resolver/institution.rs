use super::{Resolved, Resolver};
use crate::api::{Filter, ListQuery, SortDirection};
use crate::cache::{keys, Volatility};
use crate::models::Institution;
use crate::schema::fields::institution as f;

/// Matches returned by a name search.
const SEARCH_LIMIT: u32 = 20;

impl Resolver {
    pub async fn get_institution(&self, id: &str) -> Resolved<Option<Institution>> {
        self.read("get_institution", |budget| async move {
            let institution = budget
                .run(
                    "get_institution",
                    self.cached_find(
                        &self.tables.institutions,
                        keys::INSTITUTIONS,
                        id,
                        Volatility::Slow,
                    ),
                )
                .await?;
            Ok(Resolved::ok(institution))
        })
        .await
    }

    /// Case-insensitive name search. A blank query matches nothing.
    pub async fn search_institutions(&self, query: &str) -> Resolved<Vec<Institution>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Resolved::ok(Vec::new());
        }
        self.read("search_institutions", |budget| async move {
            let list = ListQuery::filtered(Filter::search(f::NAME, needle.as_str()))
                .sort_by(f::NAME, SortDirection::Asc)
                .limit(SEARCH_LIMIT);
            let found = budget
                .run(
                    "search_institutions",
                    self.cached_list(
                        &self.tables.institutions,
                        keys::scoped_key(keys::INSTITUTIONS, "search", &needle),
                        vec![keys::INSTITUTIONS.to_string()],
                        list,
                        Volatility::Slow,
                    ),
                )
                .await?;
            Ok(Resolved::ok(found))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::api::memory::Op;
    use crate::resolver::test_support::Fixture;

    #[tokio::test(start_paused = true)]
    async fn test_search_institutions() {
        let fx = Fixture::new();
        fx.seed(&fx.tables.institutions, "inst1", json!({"Name": "Northfield College", "City": "Leeds"}));
        fx.seed(&fx.tables.institutions, "inst2", json!({"Name": "Southfield University"}));
        fx.seed(&fx.tables.institutions, "inst3", json!({"Name": "Ridge Academy"}));

        let found = fx.resolver.search_institutions("  FIELD ").await;
        let names: Vec<_> = found.data.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Northfield College", "Southfield University"]);

        fx.resolver.search_institutions("field").await;
        assert_eq!(fx.backend.calls(Op::List, "Institutions"), 1);

        assert!(fx.resolver.search_institutions("   ").await.data.is_empty());
        assert_eq!(fx.backend.calls(Op::List, "Institutions"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_institution_address() {
        let fx = Fixture::new();
        fx.seed(
            &fx.tables.institutions,
            "inst1",
            json!({"Name": "Northfield College", "City": "Leeds", "Country": "UK"}),
        );
        let institution = fx.resolver.get_institution("inst1").await.data.unwrap();
        assert_eq!(institution.address_line().as_deref(), Some("Leeds, UK"));
    }
}
