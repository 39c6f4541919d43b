use crate::types::{Actor, ActorKind};
use uuid::Uuid;

/// A reference to the engine-side cause of a change, as delivered by the
/// host's event notifications. Resolution to a stable [`Actor`] happens
/// exactly once, at logging time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorRef {
    /// A connected player. The engine assigns the uuid; `name` is the
    /// player's chosen display name.
    Player { uuid: Uuid, name: String },
    /// A non-player entity. `type_tag` is the engine's stable numeric type
    /// id, `type_name` its structural name, `name` an optional nametag.
    Entity {
        type_tag: u32,
        type_name: String,
        name: Option<String>,
    },
    /// An environmental cause, identified by the block type behind it
    /// (a liquid, fire, ...).
    Environment { type_tag: u32, type_name: String },
}

/// The actor reference was structurally invalid and cannot be resolved to a
/// stable identity.
#[derive(Debug, thiserror::Error)]
#[error("invalid actor reference: {0}")]
pub struct InvalidActor(pub String);

/// Resolve an engine actor reference into the stable identity stored in the
/// change log.
///
/// Players resolve to their uuid string; everything else resolves to its
/// numeric type tag. Display names fall back to the structural type name for
/// non-living causes. Never returns empty strings: a structurally invalid
/// reference fails with [`InvalidActor`] instead.
pub fn resolve(actor: &ActorRef) -> Result<Actor, InvalidActor> {
    match actor {
        ActorRef::Player { uuid, name } => {
            if uuid.is_nil() {
                return Err(InvalidActor("player with nil uuid".into()));
            }
            if name.is_empty() {
                return Err(InvalidActor("player with empty name".into()));
            }
            Ok(Actor {
                kind: ActorKind::Player,
                identity: uuid.to_string(),
                display_name: name.clone(),
            })
        }
        ActorRef::Entity {
            type_tag,
            type_name,
            name,
        } => {
            if *type_tag == 0 || type_name.is_empty() {
                return Err(InvalidActor("entity with no type".into()));
            }
            let display = name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or(type_name);
            Ok(Actor {
                kind: ActorKind::Entity,
                identity: type_tag.to_string(),
                display_name: display.to_string(),
            })
        }
        ActorRef::Environment {
            type_tag,
            type_name,
        } => {
            if type_name.is_empty() {
                return Err(InvalidActor("environment with no type name".into()));
            }
            Ok(Actor {
                kind: ActorKind::Environment,
                identity: type_tag.to_string(),
                display_name: type_name.clone(),
            })
        }
    }
}

/// Schema version of the static entity table below.
pub const ENTITY_TABLE_VERSION: u32 = 1;

/// Known entity save names keyed by their stable numeric type tag.
///
/// The host engine keeps this mapping private; until it exposes a registry
/// interface, this versioned table is the fallback.
// TODO: source this table from the host registry interface once one exists.
const ENTITY_TYPES: [(u32, &str); 8] = [
    (32, "Zombie"),
    (33, "Creeper"),
    (34, "Skeleton"),
    (35, "Spider"),
    (61, "Arrow"),
    (64, "ItemEntity"),
    (66, "FallingBlock"),
    (84, "Minecart"),
];

/// Look up the save name for an entity type tag, if known.
pub fn entity_type_name(type_tag: u32) -> Option<&'static str> {
    ENTITY_TYPES
        .iter()
        .find(|(tag, _)| *tag == type_tag)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_resolves_to_uuid() {
        let uuid = Uuid::new_v4();
        let actor = resolve(&ActorRef::Player {
            uuid,
            name: "steve".into(),
        })
        .unwrap();
        assert_eq!(actor.kind, ActorKind::Player);
        assert_eq!(actor.identity, uuid.to_string());
        assert_eq!(actor.display_name, "steve");
    }

    #[test]
    fn entity_resolves_to_type_tag() {
        let actor = resolve(&ActorRef::Entity {
            type_tag: 32,
            type_name: "Zombie".into(),
            name: None,
        })
        .unwrap();
        assert_eq!(actor.kind, ActorKind::Entity);
        assert_eq!(actor.identity, "32");
        assert_eq!(actor.display_name, "Zombie");
    }

    #[test]
    fn named_entity_prefers_nametag() {
        let actor = resolve(&ActorRef::Entity {
            type_tag: 32,
            type_name: "Zombie".into(),
            name: Some("Bob".into()),
        })
        .unwrap();
        assert_eq!(actor.display_name, "Bob");
    }

    #[test]
    fn environment_uses_type_name() {
        let actor = resolve(&ActorRef::Environment {
            type_tag: 9,
            type_name: "water".into(),
        })
        .unwrap();
        assert_eq!(actor.kind, ActorKind::Environment);
        assert_eq!(actor.identity, "9");
        assert_eq!(actor.display_name, "water");
    }

    #[test]
    fn invalid_references_fail() {
        assert!(
            resolve(&ActorRef::Player {
                uuid: Uuid::nil(),
                name: "steve".into(),
            })
            .is_err()
        );
        assert!(
            resolve(&ActorRef::Player {
                uuid: Uuid::new_v4(),
                name: String::new(),
            })
            .is_err()
        );
        assert!(
            resolve(&ActorRef::Entity {
                type_tag: 0,
                type_name: String::new(),
                name: None,
            })
            .is_err()
        );
    }

    #[test]
    fn entity_table_lookup() {
        assert_eq!(entity_type_name(32), Some("Zombie"));
        assert_eq!(entity_type_name(9999), None);
    }
}
