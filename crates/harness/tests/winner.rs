use gallery_core::{FlagRegistry, MAIN, PRIMARY, ParentId, ResourceId};
use gallery_engine::{EngineError, FlagEngine, GalleryConfig, Missing, RetryPolicy};
use gallery_harness::TestGallery;
use gallery_storage::ResourceStore;

type TestResult = Result<(), Box<dyn std::error::Error>>;

// ============================================================================
// set_winner
// ============================================================================

#[tokio::test]
async fn moving_primary_clears_previous_holder() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(3).await?;
    let (a, b, c) = (images[0], images[1], images[2]);

    // First image got primary on attach.
    assert_eq!(gallery.holders(parent, PRIMARY).await?, vec![a]);

    let change = gallery.engine.set_winner(parent, b, PRIMARY).await?;
    assert_eq!(change.displaced, vec![a]);
    assert!(change.changed());

    let state = gallery.flag_state(parent).await?;
    assert!(!state[&a].contains(PRIMARY));
    assert!(state[&b].contains(PRIMARY));
    assert!(!state[&c].contains(PRIMARY));
    Ok(())
}

#[tokio::test]
async fn exactly_one_winner_after_any_sequence() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(5).await?;

    let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
    for _ in 0..40 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let target = images[(seed >> 33) as usize % images.len()];
        let flag = if seed & 1 == 0 { PRIMARY } else { MAIN };
        gallery.engine.set_winner(parent, target, flag).await?;

        assert_eq!(gallery.holders(parent, flag).await?, vec![target]);
        assert_eq!(gallery.holders(parent, PRIMARY).await?.len(), 1);
        assert_eq!(gallery.holders(parent, MAIN).await?.len(), 1);
    }
    Ok(())
}

#[tokio::test]
async fn repeating_a_call_is_a_no_op() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(3).await?;

    gallery.engine.set_winner(parent, images[2], PRIMARY).await?;
    let once = gallery.flag_state(parent).await?;

    let again = gallery.engine.set_winner(parent, images[2], PRIMARY).await?;
    assert!(!again.changed());
    assert_eq!(gallery.flag_state(parent).await?, once);
    Ok(())
}

#[tokio::test]
async fn other_parents_are_untouched() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (p1, first) = gallery.property_with_images(3).await?;
    let (p2, _) = gallery.property_with_images(3).await?;

    let before = gallery.flag_state(p2).await?;
    gallery.engine.set_winner(p1, first[1], PRIMARY).await?;
    gallery.engine.set_winner(p1, first[2], MAIN).await?;
    assert_eq!(gallery.flag_state(p2).await?, before);
    Ok(())
}

#[tokio::test]
async fn primary_and_main_are_independent() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(3).await?;

    gallery.engine.set_winner(parent, images[1], MAIN).await?;
    let main_before = gallery.holders(parent, MAIN).await?;

    gallery.engine.set_winner(parent, images[2], PRIMARY).await?;
    assert_eq!(gallery.holders(parent, MAIN).await?, main_before);
    assert_eq!(gallery.holders(parent, PRIMARY).await?, vec![images[2]]);
    Ok(())
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn failed_set_leaves_prior_winner() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(3).await?;
    let before = gallery.flag_state(parent).await?;

    // The clear succeeds, then the insert of the new winner aborts.
    gallery.fail_flag_inserts().await?;
    let err = gallery
        .engine
        .set_winner(parent, images[1], PRIMARY)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TransactionFailed(_)), "{err}");
    assert_eq!(gallery.flag_state(parent).await?, before);
    assert_eq!(gallery.holders(parent, PRIMARY).await?, vec![images[0]]);

    gallery.restore_flag_inserts().await?;
    gallery.engine.set_winner(parent, images[1], PRIMARY).await?;
    assert_eq!(gallery.holders(parent, PRIMARY).await?, vec![images[1]]);
    Ok(())
}

#[tokio::test]
async fn unknown_parent_is_not_found() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (_, images) = gallery.property_with_images(1).await?;
    let stranger = ParentId::new();

    let err = gallery
        .engine
        .set_winner(stranger, images[0], PRIMARY)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(Missing::Parent(p)) if p == stranger));
    Ok(())
}

#[tokio::test]
async fn unknown_resource_is_not_found() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, _) = gallery.property_with_images(1).await?;
    let ghost = ResourceId::new();

    let err = gallery.engine.set_winner(parent, ghost, PRIMARY).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(Missing::Resource(r)) if r == ghost));
    Ok(())
}

#[tokio::test]
async fn resource_of_another_parent_is_a_mismatch() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (p1, _) = gallery.property_with_images(2).await?;
    let (p2, theirs) = gallery.property_with_images(2).await?;
    let before = gallery.flag_state(p1).await?;

    let err = gallery.engine.set_winner(p1, theirs[1], PRIMARY).await.unwrap_err();
    match err {
        EngineError::Mismatch { expected, actual, .. } => {
            assert_eq!(expected, p1);
            assert_eq!(actual, p2);
        }
        other => panic!("expected mismatch, got {other}"),
    }
    assert_eq!(gallery.flag_state(p1).await?, before);
    Ok(())
}

#[tokio::test]
async fn unregistered_flag_is_rejected() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(1).await?;

    let err = gallery.engine.set_winner(parent, images[0], "cover").await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownFlag(name) if name == "cover"));
    Ok(())
}

#[tokio::test]
async fn failures_do_not_leak_connections() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(2).await?;

    for _ in 0..10 {
        let _ = gallery.engine.set_winner(ParentId::new(), images[0], PRIMARY).await;
        let _ = gallery.engine.set_winner(parent, ResourceId::new(), MAIN).await;
    }
    // The in-memory pool holds one connection: a leak would hang here.
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        gallery.engine.set_winner(parent, images[1], PRIMARY),
    )
    .await??;
    let state = gallery.store.pool_state();
    assert_eq!(state.connections, state.idle_connections);
    Ok(())
}

// ============================================================================
// Attach policy and explicit clearing
// ============================================================================

#[tokio::test]
async fn first_image_takes_every_flag() -> TestResult {
    let gallery = TestGallery::new().await?;
    let parent = gallery.property().await?;

    let first = gallery.engine.attach_resource(parent, "https://cdn.example/1.jpg").await?;
    let names: Vec<&str> = first.flags.iter().map(|f| f.as_str()).collect();
    assert_eq!(names, vec![PRIMARY, MAIN]);

    let second = gallery.engine.attach_resource(parent, "https://cdn.example/2.jpg").await?;
    assert!(second.flags.is_empty());
    assert!(second.record.order_key > first.record.order_key);
    Ok(())
}

#[tokio::test]
async fn auto_assign_can_be_narrowed() -> TestResult {
    let config = GalleryConfig::from_toml_str(r#"auto_assign = ["primary"]"#)?;
    let gallery = TestGallery::file_backed_with(config, 2).await?;
    let (parent, images) = gallery.property_with_images(2).await?;

    assert_eq!(gallery.holders(parent, PRIMARY).await?, vec![images[0]]);
    assert!(gallery.holders(parent, MAIN).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn engine_built_by_hand_honors_its_policy() -> TestResult {
    let store = ResourceStore::open_in_memory().await?;
    let engine = FlagEngine::new(store, FlagRegistry::default())
        .with_auto_assign([MAIN])?
        .with_retry_policy(RetryPolicy::none());
    assert_eq!(engine.retry_policy().max_attempts, 1);
    assert!(engine.clone().with_auto_assign(["cover"]).is_err());

    let parent = ParentId::new();
    engine.register_parent(parent).await?;
    let first = engine.attach_resource(parent, "https://cdn.example/1.jpg").await?;
    assert_eq!(engine.winner(parent, MAIN).await?, Some(first.record.resource_id));
    assert_eq!(engine.winner(parent, PRIMARY).await?, None);

    let gallery = engine.projector().list_for_parent(parent).await?;
    assert!(matches!(
        gallery.require_winners(),
        Err(EngineError::InvariantViolationDetected { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn attach_requires_a_known_parent() -> TestResult {
    let gallery = TestGallery::new().await?;
    let err = gallery
        .engine
        .attach_resource(ParentId::new(), "https://cdn.example/x.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(Missing::Parent(_))));
    Ok(())
}

#[tokio::test]
async fn cleared_flag_goes_to_next_attached_image() -> TestResult {
    let gallery = TestGallery::new().await?;
    let (parent, images) = gallery.property_with_images(2).await?;

    let cleared = gallery.engine.clear_winner(parent, PRIMARY).await?;
    assert_eq!(cleared, Some(images[0]));
    assert_eq!(gallery.engine.winner(parent, PRIMARY).await?, None);
    // main is unaffected
    assert_eq!(gallery.engine.winner(parent, MAIN).await?, Some(images[0]));

    let third = gallery.image(parent, "https://cdn.example/3.jpg").await?;
    assert_eq!(gallery.engine.winner(parent, PRIMARY).await?, Some(third));
    Ok(())
}

#[tokio::test]
async fn register_parent_is_idempotent() -> TestResult {
    let gallery = TestGallery::new().await?;
    let parent = ParentId::new();
    assert!(gallery.engine.register_parent(parent).await?);
    assert!(!gallery.engine.register_parent(parent).await?);
    Ok(())
}
