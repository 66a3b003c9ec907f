mod common;

use bson::{Bson, doc};
use common::{HotelBooking, connected};
use docmapper::prelude::*;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn before_hooks_run_in_registration_order() {
    let (mapper, spy) = connected();
    let bookings = mapper.model_of::<HotelBooking>().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = order.clone();
    bookings.before_save_hook(Hook::sync(move |ctx| {
        first.lock().unwrap().push("first");
        if let Some(record) = ctx.record_mut() {
            record.insert("source", "web");
        }
        Ok(())
    }));

    let second = order.clone();
    bookings.before_save_hook(Hook::async_fn(move |ctx| {
        let second = second.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            second.lock().unwrap().push("second");
            Ok(ctx)
        }
    }));

    let third = order.clone();
    bookings.before_save_hook(Hook::sync(move |ctx| {
        // Sees the first hook's mutation and the built-in defaults.
        assert_eq!(ctx.record().and_then(|r| r.get("source")), Some(&Bson::from("web")));
        assert_eq!(ctx.record().and_then(|r| r.get("nights")), Some(&Bson::Int32(1)));
        third.lock().unwrap().push("third");
        Ok(())
    }));

    let mut booking = bookings.entity(doc! { "guest": "Ada" });
    booking.save().await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(booking.get("source"), Some(&Bson::from("web")));
    assert_eq!(spy.calls("insert_one"), 1);
}

#[tokio::test]
async fn failing_before_hook_aborts_the_operation() {
    let (mapper, spy) = connected();
    let bookings = mapper.model_of::<HotelBooking>().unwrap();
    let later = Arc::new(Mutex::new(false));

    bookings.before_save_hook(Hook::sync(|_| Err(MapperError::hook("bookings are closed"))));
    let ran = later.clone();
    bookings.before_save_hook(Hook::sync(move |_| {
        *ran.lock().unwrap() = true;
        Ok(())
    }));

    let mut booking = bookings.entity(doc! { "guest": "Ada" });
    let err = booking.save().await.unwrap_err();

    assert!(matches!(err, MapperError::Hook(ref message) if message == "bookings are closed"));
    assert!(!*later.lock().unwrap());
    assert_eq!(spy.total_calls(), 0);
    assert_eq!(booking.as_document(), &doc! { "guest": "Ada" });
}

#[tokio::test]
async fn before_find_hook_rewrites_the_filter() {
    let (mapper, _spy) = connected();
    let bookings = mapper.model_of::<HotelBooking>().unwrap();

    let mut booking = bookings.entity(doc! { "guest": "Ada" });
    booking.save().await.unwrap();

    bookings.before_find_hook(Hook::sync(|ctx| {
        if let Some(filter) = ctx.filter_mut() {
            filter.insert("guest", "Ada");
        }
        Ok(())
    }));

    let found = bookings.find_one(doc! { "guest": "Nobody" }).await.unwrap();
    assert_eq!(found.unwrap().get_str("guest").unwrap(), "Ada");

    // The not-found error carries the filter the hooks produced.
    let stale = bookings.entity(doc! { "guest": "Nobody", "nights": 9 });
    match stale.query(doc! { "nights": 9 }).await.unwrap_err() {
        MapperError::DocumentNotFound { query, .. } => {
            assert_eq!(query, doc! { "nights": 9, "guest": "Ada" });
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn before_update_hook_can_rewrite_the_update() {
    let (mapper, spy) = connected();
    let bookings = mapper.model_of::<HotelBooking>().unwrap();

    let mut booking = bookings.entity(doc! { "guest": "Ada" });
    booking.save().await.unwrap();

    bookings.before_update_hook(Hook::sync(|ctx| {
        if let OperationArgs::Update { update, .. } = &mut ctx.args {
            update.insert("$set", doc! { "touched": true });
        }
        Ok(())
    }));

    booking
        .update_one(doc! { "$inc": { "nights": 1 } }, UpdateOptions::default())
        .await
        .unwrap();

    let stored = spy
        .inner
        .find_one("hotel_bookings", doc! { "guest": "Ada" })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_i32("nights").unwrap(), 2);
    assert!(stored.get_bool("touched").unwrap());
}

#[tokio::test]
async fn after_hooks_receive_the_outcome_with_bound_arguments() {
    let (mapper, _spy) = connected();
    let bookings = mapper.model_of::<HotelBooking>().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    bookings.after_save_hook(
        HookRegistration::new(Hook::sync(move |ctx| {
            let _ = tx.send((ctx.phase, ctx.bound.clone(), ctx.outcome.clone()));
            Ok(())
        }))
        .bind(["audit", "eu"]),
    );

    let mut booking = bookings.entity(doc! { "guest": "Ada" });
    booking.save().await.unwrap();

    let (phase, bound, outcome) = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    assert_eq!(phase, Phase::After);
    assert_eq!(bound, vec![Bson::from("audit"), Bson::from("eu")]);
    match outcome {
        Some(Outcome::Saved(record)) => assert_eq!(&record, booking.as_document()),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn after_hooks_do_not_block_the_caller() {
    let (mapper, _spy) = connected();
    let bookings = mapper.model_of::<HotelBooking>().unwrap();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    bookings.after_save_hook(Hook::async_fn(move |ctx| {
        let release_rx = release_rx.clone();
        let done_tx = done_tx.clone();
        async move {
            if let Some(rx) = release_rx.lock().await.take() {
                let _ = rx.await;
            }
            let _ = done_tx.send(());
            Ok(ctx)
        }
    }));

    let mut booking = bookings.entity(doc! { "guest": "Ada" });
    // Returns although the after-hook is still waiting to be released.
    tokio::time::timeout(WAIT, booking.save()).await.unwrap().unwrap();
    assert!(done_rx.try_recv().is_err());

    release_tx.send(()).unwrap();
    tokio::time::timeout(WAIT, done_rx.recv()).await.unwrap().unwrap();
}

#[tokio::test]
async fn failing_after_hook_does_not_affect_the_result() {
    let (mapper, spy) = connected();
    let bookings = mapper.model_of::<HotelBooking>().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    bookings.after_update_hook(Hook::sync(|_| Err(MapperError::hook("audit log unavailable"))));
    bookings.after_update_hook(Hook::sync(move |ctx| {
        if let Some(Outcome::Updated(result)) = &ctx.outcome {
            let _ = tx.send(result.clone());
        }
        Ok(())
    }));

    let updated = bookings
        .update_one(
            doc! { "guest": "Bob" },
            doc! { "$set": { "nights": 2 } },
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();

    assert_eq!(updated.get("nights"), Some(&Bson::Int32(2)));
    let result = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(result.upserted_id.is_some());
    assert_eq!(spy.calls("update_one"), 1);
}

#[tokio::test]
async fn after_find_hooks_see_cursor_and_single_results() {
    let (mapper, _spy) = connected();
    let bookings = mapper.model_of::<HotelBooking>().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    bookings.after_find_hook(Hook::sync(move |ctx| {
        let _ = tx.send(ctx.outcome.clone());
        Ok(())
    }));

    bookings.find_one(doc! { "guest": "Ada" }).await.unwrap();
    bookings.find(doc! {}, FindOptions::default()).await.unwrap();

    let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    assert!(matches!(first, Some(Outcome::FindOne(None))));
    assert!(matches!(second, Some(Outcome::Cursor)));
}

#[tokio::test]
async fn hooks_registered_later_apply_to_later_operations() {
    let (mapper, _spy) = connected();
    let bookings = mapper.model_of::<HotelBooking>().unwrap();

    let mut first = bookings.entity(doc! { "guest": "Ada" });
    first.save().await.unwrap();

    bookings.before_save_hook(Hook::sync(|ctx| {
        if let Some(record) = ctx.record_mut() {
            record.insert("late", true);
        }
        Ok(())
    }));

    let mut second = bookings.entity(doc! { "guest": "Bob" });
    second.save().await.unwrap();

    assert!(!first.contains("late"));
    assert_eq!(second.get("late"), Some(&Bson::Boolean(true)));
    assert_eq!(bookings.hooks().len(Phase::Before, Action::Save), 2);
}
