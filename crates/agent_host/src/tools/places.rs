use std::sync::Arc;

use async_trait::async_trait;
use providers::serper::{PlaceResult, SearchBackend, SearchQuery};
use shared::settings::ScanLimits;
use shared::tool::{Place, ToolCallDecision, ToolError, ToolResult};

use super::Tool;

/// `searchPlaces`: local businesses and points of interest near a location.
pub struct PlacesTool {
    search: Arc<dyn SearchBackend>,
    scan: ScanLimits,
}

impl PlacesTool {
    pub fn new(search: Arc<dyn SearchBackend>, scan: ScanLimits) -> Self {
        Self { search, scan }
    }
}

fn to_place(result: PlaceResult) -> Place {
    Place {
        title: result.title,
        address: result.address,
        rating: result.rating,
        rating_count: result.rating_count,
        category: result.category,
        phone_number: result.phone_number,
        website: result.website,
    }
}

#[async_trait]
impl Tool for PlacesTool {
    fn name(&self) -> &'static str {
        "searchPlaces"
    }

    fn description(&self) -> &'static str {
        "ONLY SEARCH for places using the given query and location"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query for places",
                },
                "location": {
                    "type": "string",
                    "description": "The location to search for places",
                },
            },
            "required": ["query", "location"],
        })
    }

    async fn invoke(&self, decision: &ToolCallDecision) -> Result<ToolResult, ToolError> {
        let query = decision.required_str("query")?;
        let location = decision.required_str("location")?;

        let request = SearchQuery::new(query)
            .num(self.scan.pages)
            .location(location);
        let results = self.search.places(request).await?;

        Ok(ToolResult::Places {
            places: results
                .into_iter()
                .take(self.scan.pages)
                .map(to_place)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fakes::*;
    use super::*;

    fn place(title: &str) -> PlaceResult {
        PlaceResult {
            title: title.into(),
            address: format!("{} Street", title),
            rating: Some(4.2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_places_query_and_truncation() {
        let search = Arc::new(FakeSearch {
            places: vec![place("A"), place("B"), place("C")],
            ..Default::default()
        });
        let scan = ScanLimits {
            pages: 2,
            social_posts: 10,
        };
        let tool = PlacesTool::new(search.clone(), scan);
        let decision = ToolCallDecision::new("searchPlaces")
            .with_arg("query", "ramen")
            .with_arg("location", "Tokyo");
        let result = tool.invoke(&decision).await.unwrap();

        let calls = search.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "places");
        assert_eq!(calls[0].1.location.as_deref(), Some("Tokyo"));

        match result {
            ToolResult::Places { places } => {
                assert_eq!(places.len(), 2);
                assert_eq!(places[1].address, "B Street");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_location_required() {
        let tool = PlacesTool::new(Arc::new(FakeSearch::default()), ScanLimits::default());
        let decision = ToolCallDecision::new("searchPlaces").with_arg("query", "ramen");
        let err = tool.invoke(&decision).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument { argument: "location", .. }));
    }
}
