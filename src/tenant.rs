use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::compactor;
use crate::limits::*;
use crate::store::WalStore;

/// One booking store per tenant (clinic, practice, ...), each with its own
/// WAL file and compactor task, created on first use.
pub struct TenantManager {
    stores: DashMap<String, Arc<WalStore>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            stores: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    pub fn tenant_count(&self) -> usize {
        self.stores.len()
    }

    /// Get or lazily open the store for `tenant`.
    ///
    /// Stores are keyed by the sanitized name, which is also the WAL file
    /// stem: names that sanitize alike share one store and one writer.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<WalStore>> {
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        // Tenant names become file names: keep [A-Za-z0-9_-] only.
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        if let Some(store) = self.stores.get(&safe_name) {
            return Ok(store.value().clone());
        }
        if self.stores.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Two callers may race to open the same tenant; the entry lock makes
        // sure only one WAL writer exists per file.
        let entry = self.stores.entry(safe_name.clone());
        let store = match entry {
            dashmap::mapref::entry::Entry::Occupied(e) => return Ok(e.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
                let store = Arc::new(WalStore::open(&wal_path)?);
                v.insert(store.clone());
                store
            }
        };

        let threshold = self.compact_threshold;
        tokio::spawn(compactor::run_compactor(store.clone(), threshold));

        tracing::info!("opened tenant {tenant}");
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.stores.len() as f64);
        Ok(store)
    }
}
