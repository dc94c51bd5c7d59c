// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for projects, repositories, artifacts, secrets, webhooks,
//! proxy audits, workflows, alerts, instructions, and settings.

use super::{scoped_key, MaterializedState};
use crate::record::Record;

pub(crate) fn apply(state: &mut MaterializedState, record: &Record) {
    match record {
        Record::ProjectUpserted { project } => {
            state.projects.insert(project.id.to_string(), project.clone());
        }

        Record::RepositoryUpserted { repository } => {
            state.repositories.insert(repository.id.to_string(), repository.clone());
        }

        Record::ArtifactsAdded { run_id, artifacts } => {
            let rows = state.artifacts.entry(run_id.to_string()).or_default();
            for artifact in artifacts {
                // Keyed by relative path; re-applied batches overwrite in place.
                match rows.iter_mut().find(|a| a.relative_path == artifact.relative_path) {
                    Some(existing) => *existing = artifact.clone(),
                    None => rows.push(artifact.clone()),
                }
            }
        }

        Record::SecretPut { secret } => {
            state
                .provider_secrets
                .insert(scoped_key(secret.repo_id.as_str(), &secret.provider), secret.clone());
        }

        Record::WebhookRecorded { delivery } => {
            state.webhook_deliveries.push(delivery.clone());
        }

        Record::ProxyAuditAppended { audit } => {
            state.proxy_audits.push(audit.clone());
        }

        Record::WorkflowUpserted { workflow } => {
            state.workflows.insert(workflow.id.to_string(), workflow.clone());
        }

        Record::ExecutionUpserted { execution } => {
            state.workflow_executions.insert(execution.id.to_string(), execution.clone());
        }

        Record::AlertRuleUpserted { rule } => {
            state.alert_rules.insert(rule.id.to_string(), rule.clone());
        }

        Record::AlertEventAppended { event } => {
            state.alert_events.push(event.clone());
        }

        Record::InstructionPut { repo_id, name, content } => {
            state.instructions.insert(scoped_key(repo_id.as_str(), name), content.clone());
        }

        Record::SettingPut { key, value } => {
            state.settings.insert(key.clone(), value.clone());
        }

        _ => {}
    }
}
