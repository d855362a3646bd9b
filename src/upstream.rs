use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{RefreshError, Result},
    session::{METADATA_SUCCESS_STATUS, Session},
};

pub const UPSTREAM_DATASOURCES_QUERY: &str = r#"
{
  workbooks {
    workbook_name: name
    workbook_id: luid
    upstreamDatasources {
      datasource_name: name
      datasource_id: luid
      has_extracts: hasExtracts
    }
  }
}
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamLink {
    pub workbook_id: String,
    pub datasource_id: String,
    pub datasource_name: String,
    pub has_extracts: bool,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    data: Option<WorkbooksData>,
}

#[derive(Debug, Deserialize)]
struct WorkbooksData {
    #[serde(default)]
    workbooks: Vec<MetadataWorkbook>,
}

#[derive(Debug, Deserialize)]
struct MetadataWorkbook {
    workbook_id: String,
    #[serde(rename = "upstreamDatasources", default)]
    upstream_datasources: Option<Vec<MetadataDatasource>>,
}

#[derive(Debug, Deserialize)]
struct MetadataDatasource {
    #[serde(default)]
    datasource_name: Option<String>,
    datasource_id: String,
    #[serde(default)]
    has_extracts: Option<bool>,
}

#[derive(Debug, Default)]
pub struct UpstreamResolver;

impl UpstreamResolver {
    pub fn new() -> Self {
        Self
    }

    /// Upstream datasources of `workbook_id` that materialize an extract.
    ///
    /// A workbook without any upstream datasource yields an empty list.
    pub async fn upstream_with_extracts<S: Session + ?Sized>(
        &self,
        session: &S,
        workbook_id: &str,
    ) -> Result<Vec<UpstreamLink>> {
        let response = session.run_metadata_query(UPSTREAM_DATASOURCES_QUERY).await?;
        if response.status != METADATA_SUCCESS_STATUS {
            return Err(RefreshError::Remote {
                status: response.status,
                body: response.body,
            });
        }

        let links = parse_links(&response.body)
            .ok_or_else(|| RefreshError::Remote {
                status: response.status,
                body: response.body.clone(),
            })?
            .into_iter()
            .filter(|link| link.workbook_id == workbook_id && link.has_extracts)
            .collect::<Vec<_>>();

        debug!(
            "workbook {} has {} upstream datasources with extracts",
            workbook_id,
            links.len()
        );
        Ok(links)
    }
}

/// Flattens every workbook's nested datasource list into one row per link.
///
/// Returns `None` when the body is not a metadata response at all.
fn parse_links(body: &str) -> Option<Vec<UpstreamLink>> {
    let response: MetadataResponse = serde_json::from_str(body).ok()?;
    let workbooks = response.data?.workbooks;

    Some(
        workbooks
            .into_iter()
            .flat_map(|workbook| {
                let workbook_id = workbook.workbook_id;
                workbook
                    .upstream_datasources
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |ds| UpstreamLink {
                        workbook_id: workbook_id.clone(),
                        datasource_id: ds.datasource_id,
                        datasource_name: ds.datasource_name.unwrap_or_default(),
                        has_extracts: ds.has_extracts.unwrap_or(false),
                    })
            })
            .collect(),
    )
}
