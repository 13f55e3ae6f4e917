//! Keyblocks: a primary key with its signatures, user ids and subkeys.
//!
//! A keyblock is an owned, ordered arena of [`Packet`]s in canonical section
//! order:
//!
//! 1. the primary key and the signatures directly on it,
//! 2. user id and attribute packets, each followed by its signatures,
//! 3. subkeys, each followed by its signatures.
//!
//! What the store search matched is recorded in a side table from packet
//! index to [`MatchKind`] instead of flag bits on the packets.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::packet::{KeyRecord, Packet, SignatureRecord, UserIdRecord};
use crate::types::{Fingerprint, KeyId};

/// What a store search matched inside a keyblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The primary key or subkey the search criterion named
    Key,
    /// The user id the search criterion matched
    UserId,
}

/// A primary key with everything attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyblock {
    packets: Vec<Packet>,
    matches: Vec<(usize, MatchKind)>,
}

impl Keyblock {
    /// Build a keyblock, checking the section order.
    ///
    /// # Arguments
    /// * `packets` - Packets in canonical order, primary key first
    ///
    /// # Returns
    /// The keyblock, or [`Error::Structural`] if the order is violated.
    pub fn new(packets: Vec<Packet>) -> Result<Self> {
        check_structure(&packets)?;
        Ok(Self {
            packets,
            matches: Vec::new(),
        })
    }

    /// All packets in order.
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Consume the keyblock, returning its packets.
    pub fn into_packets(self) -> Vec<Packet> {
        self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Always false; a keyblock holds at least its primary key.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// The primary key record.
    pub fn primary(&self) -> &KeyRecord {
        match &self.packets[0] {
            Packet::PrimaryKey(k) => k,
            // The constructor guarantees the first packet is the primary key.
            _ => unreachable!("keyblock without primary key"),
        }
    }

    pub(crate) fn primary_mut(&mut self) -> &mut KeyRecord {
        match &mut self.packets[0] {
            Packet::PrimaryKey(k) => k,
            _ => unreachable!("keyblock without primary key"),
        }
    }

    /// The key record at `index`, if that packet is a key.
    pub fn key(&self, index: usize) -> Option<&KeyRecord> {
        self.packets.get(index).and_then(Packet::as_key)
    }

    pub(crate) fn key_mut(&mut self, index: usize) -> Option<&mut KeyRecord> {
        self.packets.get_mut(index).and_then(Packet::as_key_mut)
    }

    /// The signature at `index`, if that packet is a signature.
    pub fn signature(&self, index: usize) -> Option<&SignatureRecord> {
        self.packets.get(index).and_then(Packet::as_signature)
    }

    /// The user id or attribute at `index`.
    pub fn user_id(&self, index: usize) -> Option<&UserIdRecord> {
        self.packets.get(index).and_then(Packet::as_user_id)
    }

    pub(crate) fn user_id_mut(&mut self, index: usize) -> Option<&mut UserIdRecord> {
        self.packets.get_mut(index).and_then(Packet::as_user_id_mut)
    }

    /// Primary key and subkeys with their packet indices.
    pub fn keys(&self) -> impl Iterator<Item = (usize, &KeyRecord)> {
        self.packets
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_key().map(|k| (i, k)))
    }

    /// Subkeys with their packet indices.
    pub fn subkeys(&self) -> impl Iterator<Item = (usize, &KeyRecord)> {
        self.packets.iter().enumerate().filter_map(|(i, p)| match p {
            Packet::Subkey(k) => Some((i, k)),
            _ => None,
        })
    }

    /// Packet indices of all subkeys.
    pub fn subkey_indices(&self) -> Vec<usize> {
        self.subkeys().map(|(i, _)| i).collect()
    }

    /// User ids (attributes excluded) with their packet indices.
    pub fn user_ids(&self) -> impl Iterator<Item = (usize, &UserIdRecord)> {
        self.packets.iter().enumerate().filter_map(|(i, p)| match p {
            Packet::UserId(u) => Some((i, u)),
            _ => None,
        })
    }

    /// Packet indices of all user ids (attributes excluded).
    pub fn user_id_indices(&self) -> Vec<usize> {
        self.user_ids().map(|(i, _)| i).collect()
    }

    /// The user id marked primary by the merge engine.
    pub fn primary_user_id(&self) -> Option<&UserIdRecord> {
        self.user_ids().map(|(_, u)| u).find(|u| u.is_primary)
    }

    /// Every (fingerprint, key id) pair in the keyblock.
    pub fn identities(&self) -> Vec<(Fingerprint, KeyId)> {
        self.keys()
            .map(|(_, k)| (k.fingerprint.clone(), k.keyid))
            .collect()
    }

    /// Index range of the signatures directly on the primary key.
    pub fn primary_signatures(&self) -> Range<usize> {
        1..self.user_id_section_start()
    }

    /// Index of the first user id, attribute or subkey packet.
    pub fn user_id_section_start(&self) -> usize {
        self.packets
            .iter()
            .skip(1)
            .position(|p| !matches!(p, Packet::Signature(_)))
            .map_or(self.packets.len(), |i| i + 1)
    }

    /// Index of the first subkey packet (or the length if there is none).
    pub fn subkey_section_start(&self) -> usize {
        self.packets
            .iter()
            .position(|p| matches!(p, Packet::Subkey(_)))
            .unwrap_or(self.packets.len())
    }

    /// Index range of the signatures following the packet at `index`,
    /// up to the next non-signature packet.
    pub fn signatures_after(&self, index: usize) -> Range<usize> {
        let start = index + 1;
        let end = self.packets[start.min(self.packets.len())..]
            .iter()
            .position(|p| !matches!(p, Packet::Signature(_)))
            .map_or(self.packets.len(), |i| start + i);
        start..end
    }

    /// Index range of everything between a subkey and the next subkey.
    pub fn subkey_group(&self, index: usize) -> Range<usize> {
        let start = index + 1;
        let end = self.packets[start.min(self.packets.len())..]
            .iter()
            .position(|p| matches!(p, Packet::Subkey(_)))
            .map_or(self.packets.len(), |i| start + i);
        start..end
    }

    /// Record a search match for the packet at `index`.
    ///
    /// Only one packet per kind is recorded; a later call replaces the
    /// earlier entry of the same kind.
    pub fn mark_match(&mut self, index: usize, kind: MatchKind) {
        self.matches.retain(|(_, k)| *k != kind);
        self.matches.push((index, kind));
    }

    /// Drop all recorded matches.
    pub fn clear_matches(&mut self) {
        self.matches.clear();
    }

    /// Index of the key or subkey the search matched.
    pub fn matched_key(&self) -> Option<usize> {
        self.matched(MatchKind::Key)
    }

    /// Index of the user id the search matched.
    pub fn matched_user_id(&self) -> Option<usize> {
        self.matched(MatchKind::UserId)
    }

    fn matched(&self, kind: MatchKind) -> Option<usize> {
        self.matches
            .iter()
            .find(|(_, k)| *k == kind)
            .map(|(i, _)| *i)
    }

    /// Fill in the main key id of every key that has none yet.
    pub fn setup_main_keyids(&mut self) {
        let main = self.primary().keyid;
        for packet in &mut self.packets {
            if let Some(key) = packet.as_key_mut() {
                if key.main_keyid.is_none() {
                    key.main_keyid = Some(main);
                }
            }
        }
    }
}

fn check_structure(packets: &[Packet]) -> Result<()> {
    match packets.first() {
        Some(Packet::PrimaryKey(_)) => {}
        Some(_) => {
            return Err(Error::Structural(
                "first packet is not a primary key".to_string(),
            ))
        }
        None => return Err(Error::Structural("empty keyblock".to_string())),
    }

    let mut seen_subkey = false;
    for (i, packet) in packets.iter().enumerate().skip(1) {
        match packet {
            Packet::PrimaryKey(_) => {
                return Err(Error::Structural(format!(
                    "second primary key at packet {}",
                    i
                )))
            }
            Packet::Subkey(_) => seen_subkey = true,
            Packet::UserId(_) | Packet::Attribute(_) if seen_subkey => {
                return Err(Error::Structural(format!(
                    "user id after subkey at packet {}",
                    i
                )))
            }
            _ => {}
        }
    }
    Ok(())
}
