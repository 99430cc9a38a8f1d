//! Discovery of the tables subject to partitioned retention.
//!
//! Two modes are supported. By naming convention, every table carrying the marker
//! prefix is managed together with the table named by the prefix-stripped form.
//! With a registry (`[[tables.groups]]`), exactly the listed tables are managed and
//! listed tables absent from the catalog are reported.

use std::{collections::HashSet, sync::Arc};

use serde::Serialize;

use crate::{
    config::TablesConfig,
    engine::{EngineGateway, IndexInfo, TableInfo, TableName},
    error::RetentionResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    /// The marked table of a group.
    Primary,
    /// The unmarked companion of a marked table.
    Base,
}

/// A table subject to partitioned retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedTable {
    pub table: TableName,
    pub group: String,
    pub role: TableRole,
    pub clustered_index: Option<IndexInfo>,
    /// Clustered on the configured partition scheme.
    pub aligned: bool,
    pub has_staging: bool,
}

impl ManagedTable {
    pub fn name(&self) -> &str {
        &self.table.name
    }

    /// The clustered index, unless it backs a primary key.
    pub fn droppable_index(&self) -> Option<&IndexInfo> {
        self.clustered_index.as_ref().filter(|i| !i.is_primary_key)
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Managed tables in catalog order.
    pub tables: Vec<ManagedTable>,
    /// Registry members that are not in the catalog.
    pub missing: Vec<String>,
}

pub struct TableGroupResolver {
    engine: Arc<dyn EngineGateway>,
    schema: String,
    tables: TablesConfig,
    scheme_name: String,
}

impl TableGroupResolver {
    pub fn new(
        engine: Arc<dyn EngineGateway>,
        schema: impl Into<String>,
        tables: TablesConfig,
        scheme_name: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            schema: schema.into(),
            tables,
            scheme_name: scheme_name.into(),
        }
    }

    /// Read the catalog and select the managed tables. Read-only.
    pub async fn resolve(&self) -> RetentionResult<Resolution> {
        let catalog = self.engine.list_tables(&self.schema).await?;
        let resolution = resolve_catalog(&catalog, &self.tables, &self.scheme_name);

        for missing in &resolution.missing {
            tracing::warn!(table = %missing, "Registered table not found in catalog");
        }
        tracing::debug!(
            schema = %self.schema,
            catalog_tables = catalog.len(),
            managed = resolution.tables.len(),
            registry = self.tables.uses_registry(),
            "Resolved managed tables"
        );

        Ok(resolution)
    }
}

/// Select managed tables from a catalog listing.
pub fn resolve_catalog(
    catalog: &[TableInfo],
    config: &TablesConfig,
    scheme_name: &str,
) -> Resolution {
    let names: HashSet<&str> = catalog.iter().map(|t| t.name.name.as_str()).collect();
    let candidates = catalog
        .iter()
        .filter(|t| !t.name.name.starts_with(&config.staging_prefix));

    let managed = |info: &TableInfo, group: &str, role: TableRole| ManagedTable {
        table: info.name.clone(),
        group: group.to_string(),
        role,
        clustered_index: info.clustered_index.clone(),
        aligned: info
            .clustered_index
            .as_ref()
            .and_then(|i| i.scheme.as_deref())
            == Some(scheme_name),
        has_staging: names.contains(config.staging_name(&info.name.name).as_str()),
    };

    if config.uses_registry() {
        let tables = candidates
            .filter_map(|info| {
                let name = info.name.name.as_str();
                config.groups.iter().find_map(|g| {
                    if g.primary == name {
                        Some(managed(info, &g.id, TableRole::Primary))
                    } else if g.base.as_deref() == Some(name) {
                        Some(managed(info, &g.id, TableRole::Base))
                    } else {
                        None
                    }
                })
            })
            .collect();

        let missing = config
            .groups
            .iter()
            .flat_map(|g| std::iter::once(&g.primary).chain(g.base.as_ref()))
            .filter(|name| !names.contains(name.as_str()))
            .cloned()
            .collect();

        return Resolution { tables, missing };
    }

    let stripped: HashSet<&str> = catalog
        .iter()
        .filter_map(|t| t.name.name.strip_prefix(config.marker_prefix.as_str()))
        .filter(|base| !base.is_empty())
        .collect();

    let tables = candidates
        .filter_map(|info| {
            let name = info.name.name.as_str();
            match name.strip_prefix(config.marker_prefix.as_str()) {
                Some(base) if !base.is_empty() => Some(managed(info, base, TableRole::Primary)),
                _ if stripped.contains(name) => Some(managed(info, name, TableRole::Base)),
                _ => None,
            }
        })
        .collect();

    Resolution {
        tables,
        missing: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableGroupConfig;

    fn info(name: &str, scheme: Option<&str>) -> TableInfo {
        TableInfo {
            name: TableName::new("dbo", name),
            clustered_index: scheme.map(|s| IndexInfo {
                name: format!("CIX_{name}"),
                column: "logtime".into(),
                scheme: Some(s.into()),
                is_primary_key: false,
            }),
        }
    }

    fn names(resolution: &Resolution) -> Vec<&str> {
        resolution.tables.iter().map(|t| t.name()).collect()
    }

    #[test]
    fn test_naming_convention_selects_marked_and_base_tables() {
        let catalog = vec![
            info("audit", None),
            info("main_events", Some("PS")),
            info("events", None),
            info("temp_main_events", Some("PS")),
            info("main_metrics", None),
            info("lookup", None),
        ];

        let resolution = resolve_catalog(&catalog, &TablesConfig::default(), "PS");

        assert_eq!(names(&resolution), ["main_events", "events", "main_metrics"]);
        let events = &resolution.tables[0];
        assert_eq!(events.group, "events");
        assert_eq!(events.role, TableRole::Primary);
        assert!(events.aligned);
        assert!(events.has_staging);
        assert_eq!(resolution.tables[1].role, TableRole::Base);
        assert!(!resolution.tables[1].has_staging);
    }

    #[test]
    fn test_staging_tables_never_managed() {
        let catalog = vec![info("temp_main_x", None), info("main_x", None)];
        let resolution = resolve_catalog(&catalog, &TablesConfig::default(), "PS");
        assert_eq!(names(&resolution), ["main_x"]);
    }

    #[test]
    fn test_registry_reports_missing_tables() {
        let config = TablesConfig {
            groups: vec![
                TableGroupConfig {
                    id: "events".into(),
                    primary: "main_events".into(),
                    base: Some("events".into()),
                },
                TableGroupConfig {
                    id: "metrics".into(),
                    primary: "metrics_live".into(),
                    base: None,
                },
            ],
            ..Default::default()
        };
        let catalog = vec![
            info("metrics_live", None),
            info("main_events", None),
            info("main_other", None),
        ];

        let resolution = resolve_catalog(&catalog, &config, "PS");

        assert_eq!(names(&resolution), ["metrics_live", "main_events"]);
        assert_eq!(resolution.tables[0].group, "metrics");
        assert_eq!(resolution.missing, vec!["events".to_string()]);
    }

    #[test]
    fn test_primary_key_index_not_droppable() {
        let mut catalog = vec![info("main_a", Some("PS"))];
        if let Some(index) = catalog[0].clustered_index.as_mut() {
            index.is_primary_key = true;
        }
        let resolution = resolve_catalog(&catalog, &TablesConfig::default(), "PS");
        assert!(resolution.tables[0].droppable_index().is_none());
    }
}
