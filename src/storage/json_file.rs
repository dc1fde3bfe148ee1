use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ReconciliationError, StoreResult};
use crate::matching::MatchResult;
use crate::models::{BankAccount, BankTransaction, DedupKey, Id};

use super::{ReconciliationStore, TransactionIndex};

/// JSON file-based store.
///
/// Directory structure:
/// ```text
/// data/
///   accounts/
///     {id}/
///       account.json
///       transactions.jsonl
/// ```
///
/// `transactions.jsonl` is append-only: every state change appends the full
/// record, and the last line for an id wins on load. Earlier lines stay on disk
/// as the audit trail.
///
/// The index is loaded lazily on first use. If an append fails the in-memory
/// index is dropped and rebuilt from disk on the next call.
pub struct JsonFileStore {
    base_path: PathBuf,
    index: Mutex<Option<TransactionIndex>>,
}

impl JsonFileStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            index: Mutex::new(None),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn accounts_dir(&self) -> PathBuf {
        self.base_path.join("accounts")
    }

    fn account_dir(&self, id: &Id) -> Result<PathBuf> {
        if !Id::is_path_safe(id.as_str()) {
            anyhow::bail!("Refusing to use unsafe account id as a directory: {id:?}");
        }
        Ok(self.accounts_dir().join(id.as_str()))
    }

    fn account_file(&self, id: &Id) -> Result<PathBuf> {
        Ok(self.account_dir(id)?.join("account.json"))
    }

    fn transactions_file(&self, account_id: &Id) -> Result<PathBuf> {
        Ok(self.account_dir(account_id)?.join("transactions.jsonl"))
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        Ok(())
    }

    async fn read_json<T: for<'de> serde::Deserialize<'de>>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => {
                let value = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        self.ensure_dir(path).await?;
        let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn read_jsonl<T: for<'de> serde::Deserialize<'de>>(&self, path: &Path) -> Result<Vec<T>> {
        let file = match fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut items = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await.context("Failed to read line")? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let item: T = serde_json::from_str(&line).with_context(|| {
                format!("Failed to parse {} line {line_no}", path.display())
            })?;
            items.push(item);
        }

        Ok(items)
    }

    async fn append_jsonl<T: serde::Serialize>(&self, path: &Path, items: &[T]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        self.ensure_dir(path).await?;

        let mut buf = Vec::new();
        for item in items {
            serde_json::to_writer(&mut buf, item).context("Failed to serialize item")?;
            buf.push(b'\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open {} for append", path.display()))?;
        file.write_all(&buf)
            .await
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        file.flush().await?;

        Ok(())
    }

    async fn list_dirs(&self, path: &Path) -> Result<Vec<Id>> {
        let mut ids = Vec::new();

        let mut entries = match fs::read_dir(path).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e).context("Failed to read directory"),
        };

        while let Some(entry) = entries.next_entry().await.context("Failed to read entry")? {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if Id::is_path_safe(name) => ids.push(Id::from(name)),
                other => warn!(name = ?other, "skipping account directory with unusable name"),
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn load(&self) -> Result<TransactionIndex> {
        let mut index = TransactionIndex::default();
        let mut lines = 0usize;

        for dir_id in self.list_dirs(&self.accounts_dir()).await? {
            let Some(account) = self
                .read_json::<BankAccount>(&self.account_file(&dir_id)?)
                .await?
            else {
                warn!(account_id = %dir_id, "account directory has no account.json; skipping");
                continue;
            };
            if account.id != dir_id {
                warn!(
                    dir = %dir_id,
                    account_id = %account.id,
                    "account.json id does not match its directory; skipping"
                );
                continue;
            }

            let txns: Vec<BankTransaction> =
                self.read_jsonl(&self.transactions_file(&dir_id)?).await?;
            index.upsert_account(account);
            lines += txns.len();
            for txn in txns {
                if txn.account_id != dir_id {
                    warn!(
                        transaction_id = %txn.id,
                        account_id = %dir_id,
                        "transaction filed under the wrong account; skipping"
                    );
                    continue;
                }
                index.put(txn);
            }
        }

        debug!(path = %self.base_path.display(), lines, "loaded reconciliation store");
        Ok(index)
    }

    async fn ensure_loaded<'a>(
        &self,
        slot: &'a mut Option<TransactionIndex>,
    ) -> StoreResult<&'a mut TransactionIndex> {
        if slot.is_none() {
            *slot = Some(self.load().await?);
        }
        Ok(slot.get_or_insert_with(TransactionIndex::default))
    }

    /// Append records to their accounts' logs. On failure the cached index is
    /// discarded so it cannot drift from what is on disk.
    async fn persist(
        &self,
        slot: &mut Option<TransactionIndex>,
        txns: &[BankTransaction],
    ) -> StoreResult<()> {
        let mut by_account: BTreeMap<&Id, Vec<&BankTransaction>> = BTreeMap::new();
        for txn in txns {
            by_account.entry(&txn.account_id).or_default().push(txn);
        }

        for (account_id, records) in by_account {
            let result = match self.transactions_file(account_id) {
                Ok(path) => self.append_jsonl(&path, &records).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                *slot = None;
                warn!(account_id = %account_id, error = %err, "append failed; store index invalidated");
                return Err(err.into());
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReconciliationStore for JsonFileStore {
    async fn save_account(&self, account: &BankAccount) -> StoreResult<()> {
        let mut guard = self.index.lock().await;
        self.ensure_loaded(&mut guard).await?;
        self.write_json(&self.account_file(&account.id)?, account)
            .await?;
        if let Some(index) = guard.as_mut() {
            index.upsert_account(account.clone());
        }
        Ok(())
    }

    async fn get_account(&self, id: &Id) -> StoreResult<Option<BankAccount>> {
        let mut guard = self.index.lock().await;
        Ok(self.ensure_loaded(&mut guard).await?.account(id).cloned())
    }

    async fn list_accounts(&self) -> StoreResult<Vec<BankAccount>> {
        let mut guard = self.index.lock().await;
        Ok(self.ensure_loaded(&mut guard).await?.accounts())
    }

    async fn set_account_active(&self, id: &Id, active: bool) -> StoreResult<BankAccount> {
        let mut guard = self.index.lock().await;
        let account = self
            .ensure_loaded(&mut guard)
            .await?
            .set_account_active(id, active)?;
        if let Err(err) = self.write_json(&self.account_file(id)?, &account).await {
            *guard = None;
            return Err(err.into());
        }
        Ok(account)
    }

    async fn dedup_keys(&self, account_id: &Id) -> StoreResult<HashSet<DedupKey>> {
        let mut guard = self.index.lock().await;
        Ok(self.ensure_loaded(&mut guard).await?.dedup_keys(account_id))
    }

    async fn record_transactions(
        &self,
        account_id: &Id,
        txns: &[BankTransaction],
    ) -> StoreResult<()> {
        let mut guard = self.index.lock().await;
        self.ensure_loaded(&mut guard)
            .await?
            .check_new(account_id, txns)?;
        self.persist(&mut guard, txns).await?;
        if let Some(index) = guard.as_mut() {
            for txn in txns {
                index.put(txn.clone());
            }
        }
        Ok(())
    }

    async fn get_transaction(&self, id: &Id) -> StoreResult<Option<BankTransaction>> {
        let mut guard = self.index.lock().await;
        Ok(self.ensure_loaded(&mut guard).await?.transaction(id).cloned())
    }

    async fn list_transactions(&self, account_id: &Id) -> StoreResult<Vec<BankTransaction>> {
        let mut guard = self.index.lock().await;
        Ok(self
            .ensure_loaded(&mut guard)
            .await?
            .transactions_for(account_id))
    }

    async fn list_all_transactions(&self) -> StoreResult<Vec<BankTransaction>> {
        let mut guard = self.index.lock().await;
        Ok(self.ensure_loaded(&mut guard).await?.all_transactions())
    }

    async fn apply_match(
        &self,
        result: &MatchResult,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        let mut guard = self.index.lock().await;
        let index = self.ensure_loaded(&mut guard).await?;
        match index.apply_match(result, at)? {
            Some(updated) => {
                self.persist(&mut guard, std::slice::from_ref(&updated))
                    .await?;
                Ok(updated)
            }
            None => index.transaction(&result.transaction_id).cloned().ok_or_else(|| {
                ReconciliationError::TransactionNotFound(result.transaction_id.clone())
            }),
        }
    }

    async fn confirm(
        &self,
        txn_id: &Id,
        due_id: &Id,
        operator: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        let mut guard = self.index.lock().await;
        let updated = self
            .ensure_loaded(&mut guard)
            .await?
            .confirm(txn_id, due_id, operator, at)?;
        self.persist(&mut guard, std::slice::from_ref(&updated))
            .await?;
        Ok(updated)
    }

    async fn unmatch(
        &self,
        txn_id: &Id,
        operator: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        let mut guard = self.index.lock().await;
        let updated = self
            .ensure_loaded(&mut guard)
            .await?
            .unmatch(txn_id, operator, at)?;
        self.persist(&mut guard, std::slice::from_ref(&updated))
            .await?;
        Ok(updated)
    }

    async fn reject(
        &self,
        txn_id: &Id,
        operator: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        let mut guard = self.index.lock().await;
        let updated = self
            .ensure_loaded(&mut guard)
            .await?
            .reject(txn_id, operator, reason, at)?;
        self.persist(&mut guard, std::slice::from_ref(&updated))
            .await?;
        Ok(updated)
    }

    async fn active_match_for_due(&self, due_id: &Id) -> StoreResult<Option<BankTransaction>> {
        let mut guard = self.index.lock().await;
        Ok(self
            .ensure_loaded(&mut guard)
            .await?
            .active_holder(due_id)
            .cloned())
    }

    async fn active_due_ids(&self) -> StoreResult<HashSet<Id>> {
        let mut guard = self.index.lock().await;
        Ok(self.ensure_loaded(&mut guard).await?.active_due_ids())
    }
}
