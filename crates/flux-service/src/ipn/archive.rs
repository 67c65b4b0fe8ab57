//! Per-transaction archive files.

use std::path::{Path, PathBuf};

use flux_core::IpnNotification;

/// Where a notification is archived:
/// `{data_dir}/logs/transactions/{txn_type}/{payment_status}/{txn_id}.log`.
#[must_use]
pub fn archive_path(data_dir: &Path, ipn: &IpnNotification) -> PathBuf {
    data_dir
        .join("logs")
        .join("transactions")
        .join(path_component(ipn.txn_type()))
        .join(path_component(ipn.payment_status()))
        .join(format!("{}.log", path_component(ipn.txn_id())))
}

/// Write every field as a `key: value` line, replacing any earlier archive
/// of the same transaction.
///
/// # Errors
///
/// Returns an error if the directories or the file cannot be written.
pub async fn save_details(data_dir: &Path, ipn: &IpnNotification) -> std::io::Result<PathBuf> {
    let path = archive_path(data_dir, ipn);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let contents: String = ipn
        .fields()
        .iter()
        .map(|(key, value)| format!("{key}: {value}\n"))
        .collect();
    tokio::fs::write(&path, contents).await?;

    Ok(path)
}

/// Make a notification value safe to use as one path component.
fn path_component(value: &str) -> String {
    let mut clean: String = value.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
    while clean.contains("..") {
        clean = clean.replace("..", "");
    }

    if clean.trim().is_empty() {
        "unknown".to_string()
    } else {
        clean
    }
}
