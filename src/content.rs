use std::{collections::HashMap, fmt};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Candidate, RefreshError, Result},
    session::Session,
};

const EXTRACT_SCHEDULE_TYPE: &str = "Extract";

#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Workbook,
    Datasource,
    Schedule,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Workbook => "workbook",
            ContentKind::Datasource => "datasource",
            ContentKind::Schedule => "schedule",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: String,
    pub name: String,
    pub project: Option<String>,
}

impl ContentItem {
    pub fn project_name(&self) -> &str {
        self.project.as_deref().unwrap_or("")
    }
}

/// How the caller identified the content to operate on.
///
/// A name takes precedence over an id when both are given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub name: Option<String>,
    pub id: Option<String>,
}

#[cfg(test)]
impl Target {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            id: None,
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            name: None,
            id: Some(id.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct ContentDirectory {
    cache: HashMap<ContentKind, Vec<ContentItem>>,
}

impl ContentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every cached listing; the next lookup fetches again.
    #[cfg(test)]
    pub fn refresh(&mut self) {
        self.cache.clear();
    }

    pub async fn items<S: Session + ?Sized>(
        &mut self,
        session: &S,
        kind: ContentKind,
    ) -> Result<&[ContentItem]> {
        if !self.cache.contains_key(&kind) {
            let fetched = fetch_items(session, kind).await?;
            debug!("cached {} {} listings", fetched.len(), kind);
            self.cache.insert(kind, fetched);
        }

        Ok(self.cache.get(&kind).map(Vec::as_slice).unwrap_or_default())
    }

    /// Returns the id of the single item of `kind` called `name`.
    pub async fn resolve<S: Session + ?Sized>(
        &mut self,
        session: &S,
        kind: ContentKind,
        name: &str,
    ) -> Result<String> {
        let matches: Vec<&ContentItem> = self
            .items(session, kind)
            .await?
            .iter()
            .filter(|item| item.name == name)
            .collect();

        match matches.as_slice() {
            [] => Err(RefreshError::NotFound {
                kind,
                field: "name",
                value: name.to_string(),
            }),
            [item] => Ok(item.id.clone()),
            _ => Err(RefreshError::AmbiguousName {
                kind,
                name: name.to_string(),
                candidates: matches
                    .iter()
                    .map(|item| Candidate {
                        project: item.project_name().to_string(),
                        name: item.name.clone(),
                        id: item.id.clone(),
                    })
                    .collect(),
            }),
        }
    }

    /// Turns a name or a pre-resolved id into an id.
    ///
    /// Fails with `InvalidInput` before touching the session when neither is set.
    pub async fn resolve_target<S: Session + ?Sized>(
        &mut self,
        session: &S,
        kind: ContentKind,
        target: &Target,
    ) -> Result<String> {
        let name = target.name.as_deref().filter(|n| !n.is_empty());
        let id = target.id.as_deref().filter(|i| !i.is_empty());

        match (name, id) {
            (Some(name), _) => self.resolve(session, kind, name).await,
            (None, Some(id)) => Ok(id.to_string()),
            (None, None) => Err(RefreshError::InvalidInput { kind }),
        }
    }

    pub async fn find<S: Session + ?Sized>(
        &mut self,
        session: &S,
        kind: ContentKind,
        id: &str,
    ) -> Result<ContentItem> {
        self.items(session, kind)
            .await?
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| RefreshError::NotFound {
                kind,
                field: "id",
                value: id.to_string(),
            })
    }
}

async fn fetch_items<S: Session + ?Sized>(
    session: &S,
    kind: ContentKind,
) -> Result<Vec<ContentItem>> {
    let listings = match kind {
        ContentKind::Workbook => session.list_workbooks().await?,
        ContentKind::Datasource => session.list_datasources().await?,
        ContentKind::Schedule => {
            let schedules = session.list_schedules().await?;
            return Ok(schedules
                .into_iter()
                .filter(|s| s.schedule_type == EXTRACT_SCHEDULE_TYPE)
                .map(|s| ContentItem {
                    id: s.id,
                    name: s.name,
                    project: None,
                })
                .collect());
        }
    };

    Ok(listings
        .into_iter()
        .map(|listing| ContentItem {
            id: listing.id,
            name: listing.name,
            project: listing.project.map(|p| p.name),
        })
        .collect())
}
