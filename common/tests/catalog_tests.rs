// Creator listing through the transfer service and the fake remote

mod support;

use common::errors::TransferError;
use common::models::RemoteEntry;
use common::transfer::{TransferLimits, TransferService};
use std::time::Duration;
use support::{transport, FakeRemote};

const T1: u64 = 1_700_000_000;
const T2: u64 = 1_700_003_600;

fn service(remote: FakeRemote) -> TransferService {
    TransferService::new(remote.connector(), transport(), TransferLimits::default())
}

fn alice_and_bob() -> FakeRemote {
    FakeRemote::new()
        .with_listing(
            "/data",
            vec![
                RemoteEntry::directory("alice-123"),
                RemoteEntry::file("readme.txt", Some(10), Some(T1)),
                RemoteEntry::directory("bob-456"),
            ],
        )
        .with_listing(
            "/data/alice-123",
            vec![
                RemoteEntry::file("show1.ts", Some(5_000_000), Some(T1)),
                RemoteEntry::file("show2.ts", Some(3_000_000), Some(T2)),
            ],
        )
        .with_listing("/data/bob-456", vec![])
}

#[tokio::test]
async fn lists_creators_newest_first() {
    let remote = alice_and_bob();
    let activity = remote.activity();

    let creators = service(remote).list_creators().await.unwrap();

    assert_eq!(creators.len(), 2);
    assert_eq!(creators[0].name, "alice");
    assert_eq!(creators[0].folder_name, "alice-123");
    let names: Vec<_> = creators[0].files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["show2.ts", "show1.ts"]);
    assert_eq!(creators[0].files[0].path, "/data/alice-123/show2.ts");
    assert_eq!(creators[0].files[0].size, Some(3_000_000));

    assert_eq!(creators[1].name, "bob");
    assert_eq!(creators[1].folder_name, "bob-456");
    assert!(creators[1].files.is_empty());

    assert_eq!(activity.connects(), 1);
    assert_eq!(activity.session_closes(), 1);
}

#[tokio::test]
async fn listing_serializes_for_the_client() {
    let creators = service(alice_and_bob()).list_creators().await.unwrap();
    let json = serde_json::to_value(&creators).unwrap();

    assert_eq!(json[0]["folderName"], "alice-123");
    assert_eq!(json[0]["files"][0]["name"], "show2.ts");
    assert_eq!(json[0]["files"][0]["date"], "2023-11-14T23:13:20Z");
}

#[tokio::test]
async fn failing_folder_is_kept_with_no_files() {
    let remote = alice_and_bob()
        .with_listing(
            "/data",
            vec![
                RemoteEntry::directory("alice-123"),
                RemoteEntry::directory("carol-789"),
                RemoteEntry::directory("bob-456"),
            ],
        )
        .with_failing_dir("/data/carol-789");

    let creators = service(remote).list_creators().await.unwrap();

    let folders: Vec<_> = creators.iter().map(|c| c.folder_name.as_str()).collect();
    assert_eq!(folders, ["alice-123", "carol-789", "bob-456"]);
    assert!(creators[1].files.is_empty());
    assert_eq!(creators[0].files.len(), 2);
}

#[tokio::test]
async fn empty_base_path_is_not_an_error() {
    let remote = FakeRemote::new().with_listing(
        "/data",
        vec![RemoteEntry::file("stray.ts", Some(1), None)],
    );

    let creators = service(remote).list_creators().await.unwrap();
    assert!(creators.is_empty());
}

#[tokio::test]
async fn missing_password_fails_without_connecting() {
    let remote = alice_and_bob();
    let activity = remote.activity();
    let mut config = transport();
    config.password.clear();

    let service = TransferService::new(remote.connector(), config, TransferLimits::default());
    let result = service.list_creators().await;

    assert!(matches!(result, Err(TransferError::Configuration(_))));
    assert_eq!(activity.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_connect_failures_are_retried() {
    let remote = alice_and_bob()
        .failing_connects(2, TransferError::Connection("connection reset".to_string()));
    let activity = remote.activity();

    let creators = service(remote).list_creators().await.unwrap();

    assert_eq!(creators.len(), 2);
    assert_eq!(activity.connects(), 3);
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_is_not_retried() {
    let remote = alice_and_bob()
        .failing_connects(usize::MAX, TransferError::Authentication("denied".to_string()));
    let activity = remote.activity();

    let result = service(remote).list_creators().await;

    assert!(matches!(result, Err(TransferError::Authentication(_))));
    assert_eq!(activity.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn listing_deadline_fails_whole_call_and_closes_every_session() {
    let remote = alice_and_bob().with_stalling_dir("/data/bob-456");
    let activity = remote.activity();

    let result = service(remote).list_creators().await;

    assert_eq!(
        result.unwrap_err(),
        TransferError::timeout("listing", Duration::from_secs(120))
    );
    // Timeouts are transient: three attempts, each torn down once
    assert_eq!(activity.connects(), 3);
    assert_eq!(activity.session_closes(), 3);
}
