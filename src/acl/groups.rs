// src/acl/groups.rs

//! Group administration and membership DAG maintenance
//!
//! Membership edges are validated at insert time: the containment
//! closure of the new member must not already include the group, so the
//! DAG never acquires a cycle.

use crate::db::models::{Group, GroupMember, PrincipalType};
use crate::error::{Error, Result};
use rusqlite::Connection;
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

/// Create a group with a fresh id
pub fn create_group(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
    now: i64,
) -> Result<Group> {
    if name.trim().is_empty() {
        return Err(Error::validation("name", "group name must not be empty"));
    }
    let group = Group {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: description.map(|s| s.to_string()),
        created_at: now,
    };
    group.insert(conn)?;
    Ok(group)
}

pub fn list_groups(conn: &Connection) -> Result<Vec<Group>> {
    Group::list_all(conn)
}

pub fn get_group(conn: &Connection, group_id: &str) -> Result<Group> {
    Group::find_by_id(conn, group_id)?.ok_or_else(|| Error::GroupNotFound(group_id.to_string()))
}

pub fn list_members(conn: &Connection, group_id: &str) -> Result<Vec<GroupMember>> {
    get_group(conn, group_id)?;
    GroupMember::list_for_group(conn, group_id)
}

/// Group ids transitively contained in `group_id` (excluding itself)
fn containment_closure(conn: &Connection, group_id: &str) -> Result<HashSet<String>> {
    let mut closure = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(group_id.to_string());

    while let Some(current) = queue.pop_front() {
        for contained in GroupMember::contained_groups(conn, &current)? {
            if closure.insert(contained.clone()) {
                queue.push_back(contained);
            }
        }
    }
    Ok(closure)
}

/// Add a member to a group, rejecting membership cycles
pub fn add_member(
    conn: &Connection,
    group_id: &str,
    member_type: PrincipalType,
    member_id: &str,
) -> Result<()> {
    get_group(conn, group_id)?;
    if member_id.trim().is_empty() {
        return Err(Error::validation("member_id", "member id must not be empty"));
    }

    if member_type == PrincipalType::Group {
        get_group(conn, member_id).map_err(|_| {
            Error::InvalidPrincipals(format!("member group {} does not exist", member_id))
        })?;

        if member_id == group_id || containment_closure(conn, member_id)?.contains(group_id) {
            return Err(Error::GroupCycle {
                group: group_id.to_string(),
                member: member_id.to_string(),
            });
        }
    }

    GroupMember {
        group_id: group_id.to_string(),
        member_type,
        member_id: member_id.to_string(),
    }
    .insert(conn)?;
    Ok(())
}

/// Remove a member edge; Ok(false) when the edge did not exist
pub fn remove_member(
    conn: &Connection,
    group_id: &str,
    member_type: PrincipalType,
    member_id: &str,
) -> Result<bool> {
    get_group(conn, group_id)?;
    GroupMember {
        group_id: group_id.to_string(),
        member_type,
        member_id: member_id.to_string(),
    }
    .delete(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::schema::migrate(&conn).unwrap();
        conn
    }

    fn make_group(conn: &Connection, id: &str) {
        Group {
            id: id.into(),
            name: id.to_uppercase(),
            description: None,
            created_at: 0,
        }
        .insert(conn)
        .unwrap();
    }

    #[test]
    fn test_self_membership_rejected() {
        let conn = test_conn();
        make_group(&conn, "a");
        let err = add_member(&conn, "a", PrincipalType::Group, "a").unwrap_err();
        assert!(matches!(err, Error::GroupCycle { .. }));
    }

    #[test]
    fn test_transitive_cycle_rejected() {
        let conn = test_conn();
        for id in ["a", "b", "c"] {
            make_group(&conn, id);
        }
        add_member(&conn, "a", PrincipalType::Group, "b").unwrap();
        add_member(&conn, "b", PrincipalType::Group, "c").unwrap();

        // c already sits below a; adding a under c closes the loop
        let err = add_member(&conn, "c", PrincipalType::Group, "a").unwrap_err();
        assert!(matches!(err, Error::GroupCycle { .. }));

        // no edge was inserted
        let members = list_members(&conn, "c").unwrap();
        assert!(members.is_empty());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let conn = test_conn();
        for id in ["top", "left", "right", "bottom"] {
            make_group(&conn, id);
        }
        add_member(&conn, "top", PrincipalType::Group, "left").unwrap();
        add_member(&conn, "top", PrincipalType::Group, "right").unwrap();
        add_member(&conn, "left", PrincipalType::Group, "bottom").unwrap();
        // bottom reachable via two paths, still acyclic
        add_member(&conn, "right", PrincipalType::Group, "bottom").unwrap();
    }

    #[test]
    fn test_remove_member() {
        let conn = test_conn();
        make_group(&conn, "a");
        add_member(&conn, "a", PrincipalType::User, "alice").unwrap();
        assert!(remove_member(&conn, "a", PrincipalType::User, "alice").unwrap());
        assert!(!remove_member(&conn, "a", PrincipalType::User, "alice").unwrap());
    }

    #[test]
    fn test_unknown_member_group_rejected() {
        let conn = test_conn();
        make_group(&conn, "a");
        let err = add_member(&conn, "a", PrincipalType::Group, "nope").unwrap_err();
        assert!(matches!(err, Error::InvalidPrincipals(_)));
    }
}
