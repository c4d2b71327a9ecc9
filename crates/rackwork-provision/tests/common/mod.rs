// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for provisioning tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use rackwork_core::integration::{Capability, IntegrationRecord, RuntimeIntegration};
use rackwork_core::model::{ProvisionKind, ProvisionRecord, Rack};
use rackwork_core::object_store::MemoryObjectStore;
use rackwork_core::{Config, Context};

/// In-memory context whose object store can be inspected.
pub fn context_with(config: Config) -> (Context, Arc<MemoryObjectStore>) {
    let objects = Arc::new(MemoryObjectStore::new());
    let ctx = Context::memory(config).with_objects(objects.clone());
    (ctx, objects)
}

pub fn context() -> (Context, Arc<MemoryObjectStore>) {
    context_with(Config {
        development: true,
        ..Config::default()
    })
}

/// Runtime integration `id` holding `credentials`.
pub async fn runtime(ctx: &Context, id: &str, credentials: &[(&str, &str)]) {
    ctx.store
        .save_integration(&IntegrationRecord {
            id: id.to_string(),
            organization_id: "o1".to_string(),
            capability: Capability::Runtime(RuntimeIntegration {
                provider: "aws".to_string(),
                credentials: credentials
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
        })
        .await
        .unwrap();
}

/// Rack `id` of organization `o1` using runtime integration `rt1`.
pub async fn rack(ctx: &Context, id: &str) -> Rack {
    let rack = Rack {
        id: id.to_string(),
        organization_id: "o1".to_string(),
        name: id.to_string(),
        provider: "aws".to_string(),
        host: String::new(),
        password: String::new(),
        parameters: BTreeMap::new(),
        runtime: Some("rt1".to_string()),
        locked: false,
        created: Utc::now(),
    };
    ctx.store.save_rack(&rack).await.unwrap();
    rack
}

pub async fn provision(
    ctx: &Context,
    id: &str,
    kind: ProvisionKind,
    rack: &Rack,
) -> ProvisionRecord {
    let mut record = ProvisionRecord::new(id, kind, rack);
    record.status = rackwork_core::model::Status::Starting;
    record.pid = Some("p-1".to_string());
    ctx.store.save_provision(&record).await.unwrap();
    record
}

/// Write an executable shell script.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Terraform release archive holding a stub binary.
pub fn terraform_zip() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buf);
        zip.start_file(
            "terraform",
            SimpleFileOptions::default().unix_permissions(0o644),
        )
        .unwrap();
        zip.write_all(b"#!/bin/sh\necho terraform stub\n").unwrap();
        zip.finish().unwrap();
    }
    buf.into_inner()
}

/// Lines recorded by a stub CLI in `calls`.
pub fn calls(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
