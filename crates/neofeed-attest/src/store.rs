// src/store.rs - Attestation service: signing, storage, verification, pruning
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AttestError;
use crate::records::{
    AccountAttestation, Attestation, BatchAttestation, PriceSummary, RunMetadata, RunSecret,
};

const ACCOUNT_FILE: &str = "account_attestation.json";
const BATCH_DIR: &str = "price_feed";
const BATCH_FILE_PREFIX: &str = "attestation_";
const BATCH_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Produces and verifies tamper-evident receipts on local disk.
///
/// Layout: `<base>/account_attestation.json` for the identity receipt and
/// `<base>/price_feed/attestation_<yyyyMMdd_HHmmss>_<batchId>.json` for each
/// published sub-batch.
pub struct AttestationService {
    base_dir: PathBuf,
    secret: RunSecret,
}

impl AttestationService {
    pub fn new(base_dir: impl Into<PathBuf>, secret: RunSecret) -> Self {
        Self {
            base_dir: base_dir.into(),
            secret,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create, sign and persist the account-generation receipt.
    pub fn create_account(
        &self,
        account_address: String,
        run_metadata: RunMetadata,
    ) -> Result<AccountAttestation, AttestError> {
        let mut record = AccountAttestation::new(account_address, Utc::now(), run_metadata);
        let signature = record.compute_signature(&self.secret)?;
        record.set_signature(signature);

        fs::create_dir_all(&self.base_dir)?;
        let path = self.base_dir.join(ACCOUNT_FILE);
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        info!("Account attestation written to {}", path.display());
        Ok(record)
    }

    /// Convenience wrapper filling default run metadata.
    pub fn create_account_with_defaults(
        &self,
        account_address: String,
    ) -> Result<AccountAttestation, AttestError> {
        self.create_account(account_address, RunMetadata::default())
    }

    /// Create, sign and persist a batch receipt.
    pub fn create_batch(
        &self,
        batch_id: Uuid,
        tx_hash: String,
        price_summaries: Vec<PriceSummary>,
        run_metadata: RunMetadata,
    ) -> Result<BatchAttestation, AttestError> {
        let timestamp = Utc::now();
        let mut record =
            BatchAttestation::new(batch_id, tx_hash, price_summaries, timestamp, run_metadata);
        let signature = record.compute_signature(&self.secret)?;
        record.set_signature(signature);

        let dir = self.base_dir.join(BATCH_DIR);
        fs::create_dir_all(&dir)?;
        let stem = format!(
            "{}{}_{}",
            BATCH_FILE_PREFIX,
            timestamp.format(BATCH_TIMESTAMP_FORMAT),
            batch_id
        );
        // Sub-batches of one batch can land within the same second; keep
        // one file per receipt.
        let mut path = dir.join(format!("{stem}.json"));
        let mut sequence = 1u32;
        while path.exists() {
            sequence += 1;
            path = dir.join(format!("{stem}_{sequence}.json"));
        }
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        debug!("Batch attestation written to {}", path.display());
        Ok(record)
    }

    pub fn verify_account(&self, record: &AccountAttestation) -> bool {
        record.verify(&self.secret).unwrap_or(false)
    }

    pub fn verify_batch(&self, record: &BatchAttestation) -> bool {
        record.verify(&self.secret).unwrap_or(false)
    }

    /// Load the stored account receipt, if one exists.
    pub fn load_account(&self) -> Result<AccountAttestation, AttestError> {
        let path = self.base_dir.join(ACCOUNT_FILE);
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Delete batch receipts older than `days`. Per-file failures are
    /// logged and skipped; returns the number of files removed.
    pub fn prune_older_than(&self, days: i64) -> usize {
        let dir = self.base_dir.join(BATCH_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return 0, // nothing published yet
        };
        let cutoff = Utc::now() - Duration::days(days);
        let mut removed = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(BATCH_FILE_PREFIX) && n.ends_with(".json"))
                .unwrap_or(false)
            {
                continue;
            }
            let created = file_creation_instant(&path);
            match created {
                Some(created) if created < cutoff => match fs::remove_file(&path) {
                    Ok(()) => {
                        debug!("Pruned attestation {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to prune {}: {}", path.display(), e),
                },
                Some(_) => {}
                None => warn!(
                    "Skipping attestation with unreadable timestamp: {}",
                    path.display()
                ),
            }
        }
        if removed > 0 {
            info!("Pruned {} attestation file(s) older than {} days", removed, days);
        }
        removed
    }
}

/// Creation instant of a batch attestation file: parsed from the file name,
/// falling back to filesystem modification time.
fn file_creation_instant(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_stem()?.to_str()?;
    let rest = name.strip_prefix(BATCH_FILE_PREFIX)?;
    // attestation_<yyyyMMdd_HHmmss>_<uuid>: timestamp is the first 15 chars.
    if rest.len() > 15 {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&rest[..15], BATCH_TIMESTAMP_FORMAT) {
            return Some(naive.and_utc());
        }
    }
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn secret() -> RunSecret {
        RunSecret {
            build_commit: "abc123".into(),
            run_actor: "ci-bot".into(),
            run_token: "s3cret".into(),
        }
    }

    fn summaries() -> Vec<PriceSummary> {
        vec![PriceSummary {
            symbol: "NEOUSDT".into(),
            price: "10.05".into(),
            confidence: 80,
        }]
    }

    #[test]
    fn account_receipt_persists_and_verifies() {
        let dir = TempDir::new().unwrap();
        let service = AttestationService::new(dir.path(), secret());
        let record = service
            .create_account_with_defaults("NVfJmhP28Q9qva9Tdtpt3af4H1a3cp7Lih".into())
            .unwrap();
        assert!(service.verify_account(&record));

        let loaded = service.load_account().unwrap();
        assert_eq!(loaded, record);
        assert!(dir.path().join("account_attestation.json").exists());
    }

    #[test]
    fn batch_receipt_file_name_carries_batch_id() {
        let dir = TempDir::new().unwrap();
        let service = AttestationService::new(dir.path(), secret());
        let batch_id = Uuid::new_v4();
        service
            .create_batch(batch_id, "0xfeed".into(), summaries(), RunMetadata::default())
            .unwrap();

        let batch_dir = dir.path().join("price_feed");
        let files: Vec<_> = fs::read_dir(&batch_dir).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().into_string().unwrap();
        assert!(name.starts_with("attestation_"));
        assert!(name.contains(&batch_id.to_string()));
    }

    #[test]
    fn tampered_file_fails_verification() {
        let dir = TempDir::new().unwrap();
        let service = AttestationService::new(dir.path(), secret());
        let mut record = service
            .create_batch(Uuid::new_v4(), "0xfeed".into(), summaries(), RunMetadata::default())
            .unwrap();
        assert!(service.verify_batch(&record));
        record.tx_hash = "0xforged".into();
        assert!(!service.verify_batch(&record));
    }

    #[test]
    fn prune_removes_only_old_receipts() {
        let dir = TempDir::new().unwrap();
        let service = AttestationService::new(dir.path(), secret());
        let batch_dir = dir.path().join("price_feed");
        fs::create_dir_all(&batch_dir).unwrap();

        // A receipt from 2020 and a fresh one written through the service.
        let stale = batch_dir.join(format!(
            "attestation_20200101_000000_{}.json",
            Uuid::new_v4()
        ));
        fs::write(&stale, "{}").unwrap();
        service
            .create_batch(Uuid::new_v4(), "0xfeed".into(), summaries(), RunMetadata::default())
            .unwrap();

        let removed = service.prune_older_than(7);
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert_eq!(fs::read_dir(&batch_dir).unwrap().count(), 1);
    }

    #[test]
    fn prune_with_no_batch_dir_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let service = AttestationService::new(dir.path(), secret());
        assert_eq!(service.prune_older_than(7), 0);
    }
}
