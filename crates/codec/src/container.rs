use crate::encoding::{CodecError, Payload, decode, encode};
use crate::tag::Tag;
use serde::{Deserialize, Serialize};

/// One occupied slot of a container inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSlot {
    pub index: u32,
    pub item: String,
    pub count: u32,
    /// Item-specific nested state (enchantments, damage, ...), if any.
    pub meta: Option<Tag>,
}

/// Ordered snapshot of a container's occupied slots.
///
/// Slot order is preserved through encode/decode so restoration is faithful;
/// an index absent from the list means that slot is empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub slots: Vec<ContainerSlot>,
}

impl ContainerSnapshot {
    /// The empty-container sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lower this snapshot into a state tree.
    pub fn to_tree(&self) -> Tag {
        let slots = self
            .slots
            .iter()
            .map(|slot| {
                let mut fields = vec![
                    ("index".to_string(), Tag::Int(slot.index as i32)),
                    ("item".to_string(), Tag::Str(slot.item.clone())),
                    ("count".to_string(), Tag::Int(slot.count as i32)),
                ];
                if let Some(meta) = &slot.meta {
                    fields.push(("meta".to_string(), meta.clone()));
                }
                Tag::compound(fields)
            })
            .collect();
        Tag::compound([("slots", Tag::List(slots))])
    }

    /// Rebuild a snapshot from a state tree produced by [`Self::to_tree`].
    pub fn from_tree(tree: &Tag) -> Result<Self, CodecError> {
        let slots = tree
            .get("slots")
            .and_then(Tag::as_list)
            .ok_or_else(|| CodecError::CorruptPayload("missing slots list".into()))?;
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            let index = slot
                .get("index")
                .and_then(Tag::as_int)
                .ok_or_else(|| CodecError::CorruptPayload("slot missing index".into()))?;
            let item = slot
                .get("item")
                .and_then(Tag::as_str)
                .ok_or_else(|| CodecError::CorruptPayload("slot missing item".into()))?;
            let count = slot
                .get("count")
                .and_then(Tag::as_int)
                .ok_or_else(|| CodecError::CorruptPayload("slot missing count".into()))?;
            out.push(ContainerSlot {
                index: index as u32,
                item: item.to_string(),
                count: count as u32,
                meta: slot.get("meta").cloned(),
            });
        }
        Ok(Self { slots: out })
    }

    /// Encode straight to a durable payload.
    pub fn encode(&self) -> Result<Payload, CodecError> {
        encode(&self.to_tree())
    }

    /// Decode a payload produced by [`Self::encode`].
    pub fn decode(payload: &str) -> Result<Self, CodecError> {
        Self::from_tree(&decode(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContainerSnapshot {
        ContainerSnapshot {
            slots: vec![
                ContainerSlot {
                    index: 3,
                    item: "iron_sword".into(),
                    count: 1,
                    meta: Some(Tag::compound([("damage", Tag::Int(12))])),
                },
                ContainerSlot {
                    index: 0,
                    item: "apple".into(),
                    count: 17,
                    meta: None,
                },
            ],
        }
    }

    #[test]
    fn round_trip_preserves_slot_order() {
        let snap = sample();
        let restored = ContainerSnapshot::decode(&snap.encode().unwrap()).unwrap();
        assert_eq!(restored, snap);
        // Order is as captured, not index-sorted.
        assert_eq!(restored.slots[0].index, 3);
        assert_eq!(restored.slots[1].index, 0);
    }

    #[test]
    fn empty_sentinel_round_trips() {
        let empty = ContainerSnapshot::empty();
        assert!(empty.is_empty());
        let restored = ContainerSnapshot::decode(&empty.encode().unwrap()).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn meta_survives_round_trip() {
        let snap = sample();
        let restored = ContainerSnapshot::decode(&snap.encode().unwrap()).unwrap();
        assert_eq!(
            restored.slots[0].meta.as_ref().and_then(|m| m
                .get("damage")
                .and_then(Tag::as_int)),
            Some(12)
        );
    }

    #[test]
    fn from_tree_rejects_malformed() {
        assert!(ContainerSnapshot::from_tree(&Tag::compound([("x", Tag::Int(1))])).is_err());
        let bad_slot = Tag::compound([(
            "slots",
            Tag::List(vec![Tag::compound([("item", Tag::Str("apple".into()))])]),
        )]);
        assert!(ContainerSnapshot::from_tree(&bad_slot).is_err());
    }
}
