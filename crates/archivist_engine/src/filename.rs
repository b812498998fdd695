use std::fmt::Write;

use archivist_core::JobId;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// `{sha256(job id + instant)}.json`: unique per export even when one job
/// exports twice.
pub fn export_file_name(job_id: JobId, at: DateTime<Utc>) -> String {
    let seed = format!("{job_id}{}", at.to_rfc3339_opts(SecondsFormat::Nanos, true));
    format!("{}.json", hex_digest(&seed))
}

fn hex_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn name_is_hex_digest_with_json_extension() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let name = export_file_name(JobId::new(), at);

        assert_eq!(name.len(), 64 + ".json".len());
        assert!(name.ends_with(".json"));
        assert!(name[..64].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_job_and_instant_give_same_name() {
        let id = JobId::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(export_file_name(id, at), export_file_name(id, at));
        assert_ne!(export_file_name(id, at), export_file_name(JobId::new(), at));
    }
}
