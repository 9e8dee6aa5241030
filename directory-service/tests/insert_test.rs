//! Entry insertion and tree materialization integration tests.
//!
//! Run with: TEST_DATABASE_URL=postgres://... cargo test -p directory-service -- --ignored

mod common;

use common::TestStore;
use directory_service::models::Attribute;
use directory_service::repository::tree::child_path;
use directory_service::RepositoryError;
use serial_test::serial;

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn root_then_container_then_leaf() {
    let store = TestStore::spawn().await;

    let root = store.insert("dc=example,dc=com").await;
    assert_eq!(root, 1);
    assert_eq!(store.repo.tree_path(root).await.unwrap().as_deref(), Some("1"));

    let people = store.insert("ou=people,dc=example,dc=com").await;
    assert_eq!(people, 2);
    assert_eq!(store.tree_count().await, 1, "root tree node must not be duplicated");
    assert_eq!(store.repo.tree_path(people).await.unwrap(), None);

    let alice = store.insert("cn=alice,ou=people,dc=example,dc=com").await;
    assert_eq!(alice, 3);
    assert_eq!(
        store.repo.tree_path(people).await.unwrap().as_deref(),
        Some("1/2")
    );
    assert_eq!(store.repo.tree_path(alice).await.unwrap(), None);
    assert_eq!(store.tree_count().await, 2);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn paths_follow_parent_chain() {
    let store = TestStore::spawn().await;

    store.insert("dc=example,dc=com").await;
    store.insert("ou=org,dc=example,dc=com").await;
    let dept = store.insert("ou=dept,ou=org,dc=example,dc=com").await;
    let team = store.insert("ou=team,ou=dept,ou=org,dc=example,dc=com").await;
    store
        .insert("cn=bob,ou=team,ou=dept,ou=org,dc=example,dc=com")
        .await;

    let rows: Vec<(i64, Option<i64>)> =
        sqlx::query_as("SELECT e.id, e.parent_id FROM ldap_entry e JOIN ldap_tree t ON t.id = e.id")
            .fetch_all(&store.pool)
            .await
            .unwrap();
    assert_eq!(rows.len(), 4);

    for (id, parent_id) in rows {
        let path = store.repo.tree_path(id).await.unwrap().unwrap();
        match parent_id {
            None => assert_eq!(path, id.to_string()),
            Some(parent_id) => {
                let parent_path = store.repo.tree_path(parent_id).await.unwrap().unwrap();
                assert_eq!(path, child_path(&parent_path, id));
            }
        }
    }

    let team_path = store.repo.tree_path(team).await.unwrap().unwrap();
    assert!(team_path.starts_with(&store.repo.tree_path(dept).await.unwrap().unwrap()));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn missing_parent_is_no_such_object() {
    let store = TestStore::spawn().await;
    store.insert("dc=example,dc=com").await;

    let entry = store.entry("cn=carol,ou=missing,dc=example,dc=com", Vec::new());
    let err = store.repo.insert(&store.ctx, &entry).await.unwrap_err();

    assert!(matches!(err, RepositoryError::NoSuchObject), "got {err:?}");
    assert_eq!(store.entry_count().await, 1);
    assert_eq!(store.tree_count().await, 1);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn child_of_missing_root_is_no_such_object() {
    let store = TestStore::spawn().await;

    let entry = store.entry("ou=people,dc=example,dc=com", Vec::new());
    let err = store.repo.insert(&store.ctx, &entry).await.unwrap_err();

    assert!(matches!(err, RepositoryError::NoSuchObject), "got {err:?}");
    assert_eq!(store.entry_count().await, 0);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn second_root_is_already_exists() {
    let store = TestStore::spawn().await;
    store.insert("dc=example,dc=com").await;

    let entry = store.entry("DC=Example,DC=Com", Vec::new());
    let err = store.repo.insert(&store.ctx, &entry).await.unwrap_err();

    assert!(matches!(err, RepositoryError::AlreadyExists), "got {err:?}");
    assert_eq!(store.entry_count().await, 1);
    assert_eq!(store.tree_count().await, 1);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn duplicate_sibling_is_already_exists() {
    let store = TestStore::spawn().await;
    store.insert("dc=example,dc=com").await;
    store.insert("ou=people,dc=example,dc=com").await;
    store.insert("cn=alice,ou=people,dc=example,dc=com").await;

    // Same RDN after normalization.
    let entry = store.entry("CN=Alice,ou=people,dc=example,dc=com", Vec::new());
    let err = store.repo.insert(&store.ctx, &entry).await.unwrap_err();
    assert!(matches!(err, RepositoryError::AlreadyExists), "got {err:?}");

    let entry = store.entry("ou=PEOPLE,dc=example,dc=com", Vec::new());
    let err = store.repo.insert(&store.ctx, &entry).await.unwrap_err();
    assert!(matches!(err, RepositoryError::AlreadyExists), "got {err:?}");

    assert_eq!(store.entry_count().await, 3);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn same_rdn_under_different_parents_is_allowed() {
    let store = TestStore::spawn().await;
    store.insert("dc=example,dc=com").await;
    store.insert("ou=sales,dc=example,dc=com").await;
    store.insert("ou=support,dc=example,dc=com").await;

    let a = store.insert("cn=admin,ou=sales,dc=example,dc=com").await;
    let b = store.insert("cn=admin,ou=support,dc=example,dc=com").await;
    assert_ne!(a, b);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn stored_row_keeps_original_and_normalized_forms() {
    let store = TestStore::spawn().await;
    store.insert("dc=example,dc=com").await;

    let entry = store.entry(
        "OU=People,dc=example,dc=com",
        vec![
            Attribute::new("Description", ["Staff  Directory"]),
            Attribute::new("description", ["Second"]),
        ],
    );
    let id = store.repo.insert(&store.ctx, &entry).await.unwrap();

    let (rdn_norm, rdn_orig, attrs_norm, attrs_orig): (
        String,
        String,
        serde_json::Value,
        serde_json::Value,
    ) = sqlx::query_as(
        "SELECT rdn_norm, rdn_orig, attrs_norm, attrs_orig FROM ldap_entry WHERE id = $1",
    )
    .bind(id)
    .fetch_one(&store.pool)
    .await
    .unwrap();

    assert_eq!(rdn_norm, "ou=people");
    assert_eq!(rdn_orig, "OU=People");
    assert!(attrs_norm.get("description").is_some());
    assert!(attrs_orig.get("Description").is_some());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn find_entry_reports_subordinates() {
    let store = TestStore::spawn().await;
    store.insert("dc=example,dc=com").await;
    let people = store.insert("ou=people,dc=example,dc=com").await;

    let dn = store.ctx.normalize_dn("ou=people,dc=example,dc=com").unwrap();
    let record = store.repo.find_entry(&store.ctx, &dn).await.unwrap().unwrap();
    assert_eq!(record.id, people);
    assert_eq!(record.parent_id, Some(1));
    assert!(!record.has_subordinates);

    store.insert("cn=dave,ou=people,dc=example,dc=com").await;
    let record = store.repo.find_entry(&store.ctx, &dn).await.unwrap().unwrap();
    assert!(record.has_subordinates);

    let missing = store.ctx.normalize_dn("ou=nobody,dc=example,dc=com").unwrap();
    assert!(store.repo.find_entry(&store.ctx, &missing).await.unwrap().is_none());
}
