//! Versioned entity store.
//!
//! Every mutation of a tracked entity appends exactly one immutable snapshot
//! of its full field image. Snapshots are content-addressed: the key is the
//! sha256 of the snapshot's CBOR encoding, and each snapshot records the hash
//! of its predecessor, forming a chronologically ordered chain per entity. A
//! `head/<entity>` pointer names the newest snapshot.
//!
//! Staging happens into the caller's [`sled::Batch`], so the snapshot commits
//! atomically with the entity write it describes.

use chrono::Utc;
use sled::{Batch, Db, IVec};

use super::error::PortalError;
use super::invoice::Invoice;
use super::taxpayer::TaxPayer;
use super::types::TimeStamp;

/// Full field image of a tracked entity at one point in time.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub enum EntityImage {
    #[n(0)]
    Invoice(#[n(0)] Invoice),
    #[n(1)]
    Taxpayer(#[n(0)] TaxPayer),
}

impl EntityImage {
    pub fn entity_id(&self) -> &str {
        match self {
            EntityImage::Invoice(invoice) => &invoice.id,
            EntityImage::Taxpayer(taxpayer) => &taxpayer.id,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Snapshot {
    #[n(0)]
    pub entity_id: String,
    #[n(1)]
    pub seq: u64,
    // hash of the predecessor snapshot, None for the first in the chain
    #[n(2)]
    pub prev: Option<String>,
    #[n(3)]
    pub actor: String,
    #[n(4)]
    pub taken_at: TimeStamp<Utc>,
    #[n(5)]
    pub change_reason: Option<String>,
    #[n(6)]
    pub image: EntityImage,
}

impl Snapshot {
    pub fn build(&self) -> Result<(String, Vec<u8>), PortalError> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);
        Ok((hash, cbor))
    }
}

fn head_key(entity_id: &str) -> Vec<u8> {
    format!("head/{entity_id}").into_bytes()
}

fn snap_key(hash: &str) -> Vec<u8> {
    format!("snap/{hash}").into_bytes()
}

fn load_snapshot(db: &Db, hash: &str) -> Result<Snapshot, PortalError> {
    let bytes = db.get(snap_key(hash))?.ok_or(PortalError::NotFound)?;
    Ok(minicbor::decode(&bytes)?)
}

/// Newest snapshot of an entity, if any exist.
pub fn latest(db: &Db, entity_id: &str) -> Result<Option<Snapshot>, PortalError> {
    match db.get(head_key(entity_id))? {
        Some(head) => {
            let hash = String::from_utf8_lossy(&head).to_string();
            Ok(Some(load_snapshot(db, &hash)?))
        }
        None => Ok(None),
    }
}

/// A staged snapshot that is not yet the chain head. Producing one stages
/// the snap record into the caller's batch; [`ChainLink::commit`] then
/// advances `head/<entity>` with a compare-and-swap retry, so two writers
/// that raced from the same head serialize into two sequential snapshots
/// instead of one overwriting the other's link.
#[must_use = "the snapshot is not part of the chain until commit"]
pub struct ChainLink {
    snapshot: Snapshot,
    expected_head: Option<IVec>,
    hash: String,
}

impl ChainLink {
    /// Install this snapshot as the new head. On a lost race the stale snap
    /// record is replaced with one rebased on the winner's head, then the
    /// swap is retried.
    pub fn commit(mut self, db: &Db) -> Result<String, PortalError> {
        loop {
            let swapped = db.compare_and_swap(
                head_key(&self.snapshot.entity_id),
                self.expected_head.clone(),
                Some(self.hash.as_bytes()),
            )?;
            let contended = match swapped {
                Ok(()) => return Ok(self.hash),
                Err(contended) => contended,
            };

            db.remove(snap_key(&self.hash))?;
            let (seq, prev) = head_position(db, &contended.current)?;
            self.snapshot.seq = seq;
            self.snapshot.prev = prev;
            let (hash, cbor) = self.snapshot.build()?;
            db.insert(snap_key(&hash), cbor)?;
            self.expected_head = contended.current;
            self.hash = hash;
        }
    }
}

fn head_position(
    db: &Db,
    head: &Option<IVec>,
) -> Result<(u64, Option<String>), PortalError> {
    match head {
        Some(bytes) => {
            let head_hash = String::from_utf8_lossy(bytes).to_string();
            let head = load_snapshot(db, &head_hash)?;
            Ok((head.seq + 1, Some(head_hash)))
        }
        None => Ok((0, None)),
    }
}

/// Stage the next snapshot in an entity's chain into `batch`. The sequence
/// number and predecessor link come from the current head; nothing is
/// written until the caller applies the batch and commits the returned
/// [`ChainLink`].
pub fn stage(
    db: &Db,
    batch: &mut Batch,
    image: EntityImage,
    actor: &str,
    change_reason: Option<String>,
) -> Result<ChainLink, PortalError> {
    let entity_id = image.entity_id().to_string();
    let expected_head = db.get(head_key(&entity_id))?;
    let (seq, prev) = head_position(db, &expected_head)?;

    let snapshot = Snapshot {
        entity_id,
        seq,
        prev,
        actor: actor.to_string(),
        taken_at: TimeStamp::new(),
        change_reason,
        image,
    };

    let (hash, cbor) = snapshot.build()?;
    batch.insert(snap_key(&hash), cbor);

    Ok(ChainLink {
        snapshot,
        expected_head,
        hash,
    })
}

/// The entity's full snapshot chain, oldest first. An entity that was never
/// tracked yields an empty chain.
pub fn get_history(db: &Db, entity_id: &str) -> Result<Vec<Snapshot>, PortalError> {
    let mut chain = Vec::new();
    let mut cursor = match db.get(head_key(entity_id))? {
        Some(head) => Some(String::from_utf8_lossy(&head).to_string()),
        None => None,
    };

    while let Some(hash) = cursor {
        let snapshot = load_snapshot(db, &hash)?;
        cursor = snapshot.prev.clone();
        chain.push(snapshot);
    }

    chain.reverse();
    Ok(chain)
}
