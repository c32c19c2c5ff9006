//! Test helpers shared by the registry modules

use crate::descriptor::{AgentDescriptor, DescriptorFetcher};
use agency_common::{AgencyError, DESCRIPTOR_PATH, Result};
use async_trait::async_trait;
use axum::{Json, Router, routing::get};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serve a fixed descriptor on an ephemeral port, returning the base address
pub async fn serve_descriptor(descriptor: Value) -> String {
    let app = Router::new().route(
        DESCRIPTOR_PATH,
        get(move || {
            let descriptor = descriptor.clone();
            async move { Json(descriptor) }
        }),
    );
    serve(app).await
}

/// Serve a router on an ephemeral port, returning the base address
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    address
}

/// In-process fetcher answering from a fixed address -> descriptor table
#[derive(Default)]
pub struct StubFetcher {
    descriptors: Mutex<HashMap<String, AgentDescriptor>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, address: &str, descriptor: AgentDescriptor) {
        self.descriptors
            .lock()
            .unwrap()
            .insert(address.to_string(), descriptor);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DescriptorFetcher for StubFetcher {
    async fn fetch(&self, address: &str) -> Result<AgentDescriptor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.descriptors
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| AgencyError::UpstreamUnreachable(format!("{} is offline", address)))
    }
}
