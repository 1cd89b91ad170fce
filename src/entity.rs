//! Entity, child entity, and relationship shapes
//!
//! Entities and child entities are rows translated into the UI-facing shape:
//! a stable `uid`, a human-readable `key`, and an ordered property map built
//! from the table's exportable fields. The ancestor→child edge lives only in
//! the relationship table, which is deliberately decoupled from both entity
//! tables; tree assembly therefore joins in memory and tolerates dangling
//! rows.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A top-level domain object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Stable row identifier
    pub uid: String,
    /// Human-readable key
    pub key: String,
    /// Exportable fields in schema order
    pub properties: serde_json::Value,
}

/// A domain object subordinate to an entity via a relationship record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChildEntity {
    /// Stable row identifier
    pub uid: String,
    /// Human-readable key
    pub key: String,
    /// Exportable fields in schema order
    pub properties: serde_json::Value,
}

/// The edge record linking an ancestor entity to a child entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub uid: String,
    #[serde(rename = "ancestorUid")]
    pub ancestor_uid: String,
    #[serde(rename = "childUid")]
    pub child_uid: String,
}

/// The assembled ancestor→child tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityTree {
    pub ancestors: Vec<Entity>,
    #[serde(rename = "childrenMap")]
    pub children_map: BTreeMap<String, Vec<ChildEntity>>,
}

/// A relationship row whose ancestor or child no longer resolves
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrphanedRelationship {
    pub relationship: Relationship,
    #[serde(rename = "missingAncestor")]
    pub missing_ancestor: bool,
    #[serde(rename = "missingChild")]
    pub missing_child: bool,
}

/// Assemble the entity tree from its three row sets
///
/// Two passes: index children by uid and ancestors by uid, then resolve each
/// relationship row. A row whose ancestor or child does not resolve is
/// dropped from the tree and logged; the maintenance sweep reports such rows
/// separately. Children appear under their ancestor in relationship order.
pub fn assemble_tree(
    ancestors: Vec<Entity>,
    relationships: &[Relationship],
    children: Vec<ChildEntity>,
) -> EntityTree {
    let ancestor_uids: BTreeSet<&str> = ancestors.iter().map(|e| e.uid.as_str()).collect();
    let child_index: BTreeMap<&str, &ChildEntity> =
        children.iter().map(|c| (c.uid.as_str(), c)).collect();

    let mut children_map: BTreeMap<String, Vec<ChildEntity>> = BTreeMap::new();

    for relationship in relationships {
        let has_ancestor = ancestor_uids.contains(relationship.ancestor_uid.as_str());
        let child = child_index.get(relationship.child_uid.as_str());

        match (has_ancestor, child) {
            (true, Some(child)) => {
                children_map
                    .entry(relationship.ancestor_uid.clone())
                    .or_default()
                    .push((*child).clone());
            }
            _ => {
                warn!(
                    relationship_uid = %relationship.uid,
                    ancestor_uid = %relationship.ancestor_uid,
                    child_uid = %relationship.child_uid,
                    "dropping orphaned relationship from tree"
                );
            }
        }
    }

    EntityTree {
        ancestors,
        children_map,
    }
}

/// Report relationship rows that dangle on either side
///
/// Used by the maintenance sweep, never by the tree hot path.
pub fn find_orphans(
    relationships: &[Relationship],
    ancestor_uids: &BTreeSet<String>,
    child_uids: &BTreeSet<String>,
) -> Vec<OrphanedRelationship> {
    relationships
        .iter()
        .filter_map(|relationship| {
            let missing_ancestor = !ancestor_uids.contains(&relationship.ancestor_uid);
            let missing_child = !child_uids.contains(&relationship.child_uid);
            if missing_ancestor || missing_child {
                Some(OrphanedRelationship {
                    relationship: relationship.clone(),
                    missing_ancestor,
                    missing_child,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(uid: &str, key: &str) -> Entity {
        Entity {
            uid: uid.to_string(),
            key: key.to_string(),
            properties: serde_json::json!({ "key": key }),
        }
    }

    fn child(uid: &str, key: &str) -> ChildEntity {
        ChildEntity {
            uid: uid.to_string(),
            key: key.to_string(),
            properties: serde_json::json!({ "key": key }),
        }
    }

    fn relationship(uid: &str, ancestor: &str, child: &str) -> Relationship {
        Relationship {
            uid: uid.to_string(),
            ancestor_uid: ancestor.to_string(),
            child_uid: child.to_string(),
        }
    }

    #[test]
    fn test_assemble_tree_groups_children_by_ancestor() {
        let ancestors = vec![entity("a1", "aspirin"), entity("a2", "ibuprofen")];
        let children = vec![child("c1", "aspirin-500"), child("c2", "aspirin-100"), child("c3", "ibu-200")];
        let relationships = vec![
            relationship("r1", "a1", "c1"),
            relationship("r2", "a1", "c2"),
            relationship("r3", "a2", "c3"),
        ];

        let tree = assemble_tree(ancestors, &relationships, children);

        assert_eq!(tree.ancestors.len(), 2);
        let a1_children: Vec<&str> = tree.children_map["a1"]
            .iter()
            .map(|c| c.uid.as_str())
            .collect();
        assert_eq!(a1_children, vec!["c1", "c2"]);
        assert_eq!(tree.children_map["a2"].len(), 1);
    }

    #[test]
    fn test_assemble_tree_drops_orphans_silently() {
        let ancestors = vec![entity("a1", "aspirin")];
        let children = vec![child("c1", "aspirin-500")];
        let relationships = vec![
            relationship("r1", "a1", "c1"),
            relationship("r2", "a1", "gone-child"),
            relationship("r3", "gone-ancestor", "c1"),
        ];

        let tree = assemble_tree(ancestors, &relationships, children);

        assert_eq!(tree.children_map.len(), 1);
        assert_eq!(tree.children_map["a1"].len(), 1);
    }

    #[test]
    fn test_assemble_tree_empty_inputs() {
        let tree = assemble_tree(Vec::new(), &[], Vec::new());
        assert!(tree.ancestors.is_empty());
        assert!(tree.children_map.is_empty());
    }

    #[test]
    fn test_ancestor_without_children_has_no_map_entry() {
        let ancestors = vec![entity("a1", "aspirin")];
        let tree = assemble_tree(ancestors, &[], Vec::new());
        assert!(!tree.children_map.contains_key("a1"));
    }

    #[test]
    fn test_find_orphans() {
        let relationships = vec![
            relationship("r1", "a1", "c1"),
            relationship("r2", "a1", "missing"),
            relationship("r3", "missing", "missing-too"),
        ];
        let ancestor_uids: BTreeSet<String> = ["a1".to_string()].into();
        let child_uids: BTreeSet<String> = ["c1".to_string()].into();

        let orphans = find_orphans(&relationships, &ancestor_uids, &child_uids);

        assert_eq!(orphans.len(), 2);
        assert_eq!(orphans[0].relationship.uid, "r2");
        assert!(!orphans[0].missing_ancestor);
        assert!(orphans[0].missing_child);
        assert!(orphans[1].missing_ancestor);
        assert!(orphans[1].missing_child);
    }

    #[test]
    fn test_tree_serialization_shape() {
        let ancestors = vec![entity("a1", "aspirin")];
        let children = vec![child("c1", "aspirin-500")];
        let relationships = vec![relationship("r1", "a1", "c1")];

        let tree = assemble_tree(ancestors, &relationships, children);
        let json = serde_json::to_value(&tree).unwrap();

        assert!(json.get("ancestors").is_some());
        assert!(json.get("childrenMap").is_some());
        assert_eq!(json["childrenMap"]["a1"][0]["uid"], "c1");
    }
}
