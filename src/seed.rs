//! Seed data generator
//!
//! Builds a deterministic sponsor tree and writes it as JSON shards:
//! `bucket_NNNN.json` files keyed by `sha256(memberId)` plus lookup
//! indexes under `index/`. Used by the `generate-users` binary.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::info;

use crate::engine::membership::{renew_until, DAY_MS};
use crate::engine::plan::career_level_for;
use crate::engine::MembershipType;

pub const BUCKET_COUNT: usize = 1024;

/// 2025-01-01T00:00:00Z, start of the generated join dates
const EPOCH_MS: i64 = 1_735_689_600_000;

const FIRST_NAMES: &[&str] = &[
    "Ayse", "Mehmet", "Elif", "Ahmet", "Zeynep", "Mustafa", "Fatma", "Emre", "Selin", "Burak",
    "Derya", "Can", "Ece", "Kerem", "Irem", "Onur",
];
const LAST_NAMES: &[&str] = &[
    "Yilmaz", "Kaya", "Demir", "Sahin", "Celik", "Yildiz", "Aydin", "Ozturk", "Arslan", "Dogan",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedMember {
    pub member_id: String,
    pub referral_code: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    /// memberId of the sponsor
    pub sponsor_id: Option<String>,
    pub sponsor_level: i64,
    pub monoline_position: i64,
    pub career_level: String,
    pub membership_type: String,
    pub is_active: bool,
    pub active_until: i64,
    pub created_at: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct SeedIndex {
    pub referral_codes: BTreeMap<String, String>,
    pub phones: BTreeMap<String, String>,
    pub member_ids: BTreeMap<String, usize>,
    pub sponsors: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub members: usize,
    pub buckets_used: usize,
}

/// Shard of a member: first four digest bytes, big-endian, modulo the bucket count
pub fn bucket_for(member_id: &str) -> usize {
    let digest = Sha256::digest(member_id.as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head as usize % BUCKET_COUNT
}

fn unique_code(rng: &mut StdRng, taken: &mut HashSet<String>) -> String {
    loop {
        let bytes: [u8; 5] = rng.gen();
        let code: String = base32::encode(base32::Alphabet::Crockford, &bytes)
            .chars()
            .take(8)
            .collect();
        if taken.insert(code.clone()) {
            return code;
        }
    }
}

/// Same `seed` and `count` always give the same members
pub fn generate_members(count: usize, seed: u64) -> Vec<SeedMember> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut taken = HashSet::new();
    let mut sponsors: Vec<Option<usize>> = Vec::with_capacity(count);
    let mut members: Vec<SeedMember> = Vec::with_capacity(count);

    for i in 0..count {
        let sponsor = (i > 0).then(|| rng.gen_range(0..i));
        let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
        let membership = match rng.gen_range(0..10) {
            0..=5 => MembershipType::Monthly,
            6..=7 => MembershipType::Yearly,
            _ => MembershipType::Entry,
        };
        let created_at = EPOCH_MS + i as i64 * 3_600_000;
        let renewed_at = created_at + rng.gen_range(0..60) * DAY_MS;
        let sponsor_id = sponsor.map(|s| members[s].member_id.clone());
        let sponsor_level = sponsor.map_or(0, |s| members[s].sponsor_level + 1);

        sponsors.push(sponsor);
        members.push(SeedMember {
            member_id: format!("MB{}", unique_code(&mut rng, &mut taken)),
            referral_code: unique_code(&mut rng, &mut taken),
            full_name: format!("{} {}", first, last),
            email: format!("{}.{}{}@example.org", first, last, i).to_lowercase(),
            phone: format!("+90555{:07}", i),
            sponsor_id,
            sponsor_level,
            monoline_position: i as i64 + 1,
            career_level: String::new(),
            membership_type: membership.as_str().to_string(),
            is_active: rng.gen_bool(0.8),
            active_until: renew_until(None, renewed_at, membership),
            created_at,
        });
    }

    // sponsors always precede their referrals, so one backward pass sums subtrees
    let mut team = vec![0i64; count];
    let mut active_directs = vec![0i64; count];
    for i in (0..count).rev() {
        if let Some(s) = sponsors[i] {
            team[s] += team[i] + 1;
            if members[i].is_active {
                active_directs[s] += 1;
            }
        }
    }
    for (i, member) in members.iter_mut().enumerate() {
        member.career_level = career_level_for(active_directs[i], team[i]).name.to_string();
    }
    members
}

pub fn build_index(members: &[SeedMember]) -> SeedIndex {
    let mut index = SeedIndex::default();
    for m in members {
        index
            .referral_codes
            .insert(m.referral_code.clone(), m.member_id.clone());
        index.phones.insert(m.phone.clone(), m.member_id.clone());
        index
            .member_ids
            .insert(m.member_id.clone(), bucket_for(&m.member_id));
        if let Some(sponsor) = &m.sponsor_id {
            index
                .sponsors
                .entry(sponsor.clone())
                .or_default()
                .push(m.member_id.clone());
        }
    }
    index
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("cannot write {}", path.display()))
}

/// Writes every bucket file (empty ones included) and the four indexes
pub fn write_seed(out: &Path, members: &[SeedMember]) -> Result<SeedSummary> {
    let index_dir = out.join("index");
    std::fs::create_dir_all(&index_dir)
        .with_context(|| format!("cannot create {}", index_dir.display()))?;

    let mut buckets: Vec<Vec<&SeedMember>> = vec![Vec::new(); BUCKET_COUNT];
    for m in members {
        buckets[bucket_for(&m.member_id)].push(m);
    }
    for (n, bucket) in buckets.iter().enumerate() {
        write_json(&out.join(format!("bucket_{:04}.json", n)), bucket)?;
    }

    let index = build_index(members);
    write_json(&index_dir.join("referral_codes.json"), &index.referral_codes)?;
    write_json(&index_dir.join("phones.json"), &index.phones)?;
    write_json(&index_dir.join("member_ids.json"), &index.member_ids)?;
    write_json(&index_dir.join("sponsors.json"), &index.sponsors)?;

    let summary = SeedSummary {
        members: members.len(),
        buckets_used: buckets.iter().filter(|b| !b.is_empty()).count(),
    };
    info!(
        "Seed written to {}: {} members in {} buckets",
        out.display(),
        summary.members,
        summary.buckets_used
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate_members(50, 7);
        let b = generate_members(50, 7);
        assert_eq!(a, b);
        assert_ne!(a, generate_members(50, 8));
    }

    #[test]
    fn test_tree_shape() {
        let members = generate_members(200, 42);
        assert!(members[0].sponsor_id.is_none());
        assert!(members[1..].iter().all(|m| m.sponsor_id.is_some()));
        let positions: Vec<i64> = members.iter().map(|m| m.monoline_position).collect();
        assert_eq!(positions, (1..=200).collect::<Vec<_>>());
        assert!(members.iter().all(|m| !m.career_level.is_empty()));
        let second = &members[1];
        assert_eq!(second.sponsor_id.as_deref(), Some(members[0].member_id.as_str()));
        assert_eq!(second.sponsor_level, 1);
    }

    #[test]
    fn test_bucket_range_and_stability() {
        let b = bucket_for("MB7K2QH9XA");
        assert!(b < BUCKET_COUNT);
        assert_eq!(b, bucket_for("MB7K2QH9XA"));
    }

    #[test]
    fn test_written_indexes_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let members = generate_members(300, 42);
        let summary = write_seed(dir.path(), &members).unwrap();
        assert_eq!(summary.members, 300);

        for n in [0, BUCKET_COUNT - 1] {
            assert!(dir.path().join(format!("bucket_{:04}.json", n)).exists());
        }

        let raw = std::fs::read(dir.path().join("index/member_ids.json")).unwrap();
        let member_ids: BTreeMap<String, usize> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(member_ids.len(), 300);
        for (member_id, bucket) in &member_ids {
            let raw = std::fs::read(dir.path().join(format!("bucket_{:04}.json", bucket))).unwrap();
            let shard: Vec<SeedMember> = serde_json::from_slice(&raw).unwrap();
            assert!(shard.iter().any(|m| &m.member_id == member_id));
        }

        let raw = std::fs::read(dir.path().join("index/sponsors.json")).unwrap();
        let sponsors: BTreeMap<String, Vec<String>> = serde_json::from_slice(&raw).unwrap();
        let children: usize = sponsors.values().map(Vec::len).sum();
        assert_eq!(children, 299);
        for key in sponsors.keys() {
            assert!(member_ids.contains_key(key));
        }
    }
}
