use gallery_core::{MAIN, PRIMARY, ResourceId};
use gallery_engine::{EngineError, Missing};
use gallery_harness::TestGallery;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::test]
async fn deleting_the_winner_promotes_lowest_order_key() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(3).await?;
    let (a, b, c) = (images[0], images[1], images[2]);
    gallery.engine.set_winner(parent, b, PRIMARY).await?;

    let reconciliation = gallery.engine.on_resource_deleted(b).await?;
    assert_eq!(reconciliation.parent_id, parent);
    assert_eq!(reconciliation.deleted, b);
    assert_eq!(reconciliation.promotions.len(), 1);
    assert_eq!(reconciliation.promotions[0].flag.as_str(), PRIMARY);
    assert_eq!(reconciliation.promotions[0].promoted, Some(a));

    let state = gallery.flag_state(parent).await?;
    assert_eq!(state.len(), 2);
    assert!(state[&a].contains(PRIMARY));
    assert!(!state[&c].contains(PRIMARY));
    Ok(())
}

#[tokio::test]
async fn promotion_skips_over_earlier_deleted_images() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(4).await?;
    gallery.engine.set_winner(parent, images[3], PRIMARY).await?;

    // images[0] still holds main; deleting it hands main to images[1].
    gallery.engine.on_resource_deleted(images[0]).await?;
    assert_eq!(gallery.holders(parent, MAIN).await?, vec![images[1]]);

    // Remaining: [1, 2, 3(primary)]. Deleting 3 promotes 1.
    gallery.engine.on_resource_deleted(images[3]).await?;
    assert_eq!(gallery.holders(parent, PRIMARY).await?, vec![images[1]]);
    Ok(())
}

#[tokio::test]
async fn every_held_flag_is_reconciled() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(3).await?;

    // images[0] holds both flags from the attach policy.
    let reconciliation = gallery.engine.on_resource_deleted(images[0]).await?;
    let mut flags: Vec<&str> = reconciliation.promotions.iter().map(|p| p.flag.as_str()).collect();
    flags.sort();
    assert_eq!(flags, vec![MAIN, PRIMARY]);
    assert!(reconciliation.promotions.iter().all(|p| p.promoted == Some(images[1])));
    assert_eq!(gallery.holders(parent, PRIMARY).await?, vec![images[1]]);
    assert_eq!(gallery.holders(parent, MAIN).await?, vec![images[1]]);
    Ok(())
}

#[tokio::test]
async fn deleting_a_non_winner_changes_no_flags() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(3).await?;

    let reconciliation = gallery.engine.on_resource_deleted(images[2]).await?;
    assert!(reconciliation.promotions.is_empty());
    assert_eq!(gallery.holders(parent, PRIMARY).await?, vec![images[0]]);
    assert_eq!(gallery.holders(parent, MAIN).await?, vec![images[0]]);
    Ok(())
}

#[tokio::test]
async fn deleting_the_last_image_leaves_flags_unset() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(1).await?;

    let reconciliation = gallery.engine.on_resource_deleted(images[0]).await?;
    assert_eq!(reconciliation.promotions.len(), 2);
    assert!(reconciliation.promotions.iter().all(|p| p.promoted.is_none()));
    assert!(gallery.flag_state(parent).await?.is_empty());

    // An empty parent is not an invariant violation.
    let view = gallery.projector.list_for_parent(parent).await?;
    assert!(view.missing_winners.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleting_an_unknown_resource_is_not_found() -> TestResult {
    let gallery = TestGallery::new().await?;
    let ghost = ResourceId::new();
    let err = gallery.engine.on_resource_deleted(ghost).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(Missing::Resource(r)) if r == ghost));
    Ok(())
}

#[tokio::test]
async fn deleting_twice_is_not_found() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (_, images) = gallery.property_with_images(2).await?;
    gallery.engine.on_resource_deleted(images[1]).await?;
    let err = gallery.engine.on_resource_deleted(images[1]).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn failed_promotion_keeps_the_resource() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(2).await?;
    let before = gallery.flag_state(parent).await?;

    gallery.fail_flag_inserts().await?;
    let err = gallery.engine.on_resource_deleted(images[0]).await.unwrap_err();
    assert!(matches!(err, EngineError::TransactionFailed(_)), "{err}");

    // Deletion and reconciliation share one unit of work.
    assert_eq!(gallery.flag_state(parent).await?, before);
    Ok(())
}
