//! Cascading delete orchestration.
//!
//! # Responsibility
//! - Register DELETE pre-run checks that clear dependent rows first.
//! - Report dependent failures to the exception sink, then abort.
//!
//! # Invariants
//! - Dependents are deleted strictly in declared order, one at a time.
//! - A sub-dependent is deleted only after its dependent succeeded.
//! - An empty affected-id set deletes nothing and succeeds.

use crate::context::current_affected_ids;
use crate::context::AffectedIds;
use crate::error::{ApiError, ApiResult};
use crate::hooks::{HookContext, HookRegistry, HookVerb};
use crate::model::filter::Filter;
use crate::repo::catalog::{ResourceCatalog, NAMESPACE_AUTH, NAMESPACE_FLEET};
use crate::sink::{CaptureMetadata, ExceptionSink};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Second-level cleanup run after its parent dependent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubDependentSpec {
    pub resource: String,
    pub foreign_key: String,
}

/// Child resource purged when a parent row is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentSpec {
    pub resource: String,
    pub foreign_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_dependent: Option<SubDependentSpec>,
}

impl DependentSpec {
    pub fn new(resource: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            foreign_key: foreign_key.into(),
            sub_dependent: None,
        }
    }

    pub fn with_sub_dependent(
        mut self,
        resource: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.sub_dependent = Some(SubDependentSpec {
            resource: resource.into(),
            foreign_key: foreign_key.into(),
        });
        self
    }
}

/// Ordered dependents of one primary resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeRule {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub resource: String,
    pub dependents: Vec<DependentSpec>,
}

fn default_namespace() -> String {
    NAMESPACE_FLEET.to_string()
}

impl CascadeRule {
    pub fn new(
        namespace: impl Into<String>,
        resource: impl Into<String>,
        dependents: Vec<DependentSpec>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            resource: resource.into(),
            dependents,
        }
    }

    /// Cascades of the default fleet and auth schema.
    pub fn fleet_defaults() -> Vec<CascadeRule> {
        vec![
            CascadeRule::new(
                NAMESPACE_FLEET,
                "device",
                vec![
                    DependentSpec::new("device_config_variable", "device_id"),
                    DependentSpec::new("device_environment_variable", "device_id")
                        .with_sub_dependent("image_install", "device_id"),
                    DependentSpec::new("device_tag", "device_id"),
                ],
            ),
            CascadeRule::new(
                NAMESPACE_FLEET,
                "application",
                vec![
                    DependentSpec::new("application_config_variable", "application_id"),
                    DependentSpec::new("application_environment_variable", "application_id"),
                    DependentSpec::new("device", "application_id"),
                ],
            ),
            CascadeRule::new(
                NAMESPACE_AUTH,
                "api_key",
                vec![DependentSpec::new("api_key__has__permission", "api_key_id")],
            ),
            CascadeRule::new(
                NAMESPACE_AUTH,
                "permission",
                vec![DependentSpec::new("api_key__has__permission", "permission_id")],
            ),
        ]
    }

    /// Checks every named resource and foreign key against `catalog`.
    ///
    /// # Errors
    /// - `UnknownResource` / `UnknownField` for names the catalog lacks.
    /// - `NamespaceMismatch` when the rule's namespace differs from the
    ///   resource's catalog namespace.
    pub fn validate(&self, catalog: &ResourceCatalog) -> ApiResult<()> {
        let primary = catalog.resolve(&self.resource)?;
        if primary.namespace() != self.namespace {
            return Err(ApiError::NamespaceMismatch {
                resource: self.resource.clone(),
                declared: self.namespace.clone(),
                actual: primary.namespace().to_string(),
            });
        }
        for dependent in &self.dependents {
            catalog
                .resolve(&dependent.resource)?
                .require_column(&dependent.foreign_key)?;
            if let Some(sub) = &dependent.sub_dependent {
                catalog.resolve(&sub.resource)?.require_column(&sub.foreign_key)?;
            }
        }
        Ok(())
    }
}

/// Registers a DELETE pre-run check on `resource` that clears `dependents`.
pub fn register_cascade_delete(
    registry: &mut HookRegistry,
    namespace: &str,
    resource: &str,
    dependents: Vec<DependentSpec>,
    sink: Arc<dyn ExceptionSink>,
) {
    info!(
        "event=cascade_register module=cascade status=ok namespace={} resource={} dependents={}",
        namespace,
        resource,
        dependents.len()
    );
    registry.register_pre_run_hook(HookVerb::Delete, namespace, resource, move |context| {
        cascade_delete(context, &dependents, sink.as_ref())
    });
}

/// Registers every rule in order.
pub fn register_cascade_rules(
    registry: &mut HookRegistry,
    rules: &[CascadeRule],
    sink: Arc<dyn ExceptionSink>,
) {
    for rule in rules {
        register_cascade_delete(
            registry,
            &rule.namespace,
            &rule.resource,
            rule.dependents.clone(),
            Arc::clone(&sink),
        );
    }
}

/// Deletes the dependents of the rows targeted by `context`.
pub fn cascade_delete(
    context: &HookContext<'_>,
    dependents: &[DependentSpec],
    sink: &dyn ExceptionSink,
) -> ApiResult<()> {
    let affected = current_affected_ids(
        context.request,
        context.accessor,
        context.resource,
        context.filter,
    )?;
    if affected.is_empty() {
        debug!(
            "event=cascade_delete module=cascade status=skipped resource={} reason=no_affected_ids request_id={}",
            context.resource,
            context.request.request_id()
        );
        return Ok(());
    }

    for dependent in dependents {
        delete_dependent(
            context,
            &dependent.resource,
            &dependent.foreign_key,
            &affected,
            sink,
        )?;
        if let Some(sub) = &dependent.sub_dependent {
            delete_dependent(context, &sub.resource, &sub.foreign_key, &affected, sink)?;
        }
    }

    debug!(
        "event=cascade_delete module=cascade status=ok resource={} affected={} dependents={} request_id={}",
        context.resource,
        affected.len(),
        dependents.len(),
        context.request.request_id()
    );
    Ok(())
}

fn delete_dependent(
    context: &HookContext<'_>,
    resource: &str,
    foreign_key: &str,
    affected: &AffectedIds,
    sink: &dyn ExceptionSink,
) -> ApiResult<()> {
    let filter = Filter::new().with_in(foreign_key, affected.to_values());
    match context.accessor.delete(resource, &filter) {
        Ok(()) => Ok(()),
        Err(err) => {
            let metadata = CaptureMetadata {
                resource: resource.to_string(),
                parent: context.resource.to_string(),
                request_id: context.request.request_id(),
                actor: context.request.actor(),
            };
            sink.capture(
                &err,
                &format!("Error deleting {}'s {resource}", context.resource),
                &metadata,
            );
            Err(ApiError::DependentDeletion {
                resource: resource.to_string(),
                parent: context.resource.to_string(),
                source: Box::new(err),
            })
        }
    }
}
