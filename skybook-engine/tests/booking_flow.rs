use skybook_core::models::Flight;
use skybook_engine::Session;
use skybook_store::{MemConn, MemStore};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("skybook_engine=debug,skybook_store=debug")
        .try_init();
}

fn flight(fid: i64, day: i32, origin: &str, dest: &str, duration: i32, capacity: i32, price: i64) -> Flight {
    Flight {
        fid,
        day_of_month: day,
        carrier_id: "AS".to_string(),
        flight_num: fid as i32,
        origin_city: origin.to_string(),
        dest_city: dest.to_string(),
        duration,
        capacity,
        price,
        canceled: false,
    }
}

async fn store_with_flights(flights: Vec<Flight>) -> MemStore {
    let store = MemStore::new();
    for f in flights {
        store.insert_flight(f).await;
    }
    store
}

async fn logged_in_session(store: &MemStore, name: &str, balance: i64) -> Session<MemConn> {
    let mut session = Session::new(store.session());
    assert_eq!(
        session.create_customer(name, "pw", balance).await,
        format!("Created user {}\n", name)
    );
    assert_eq!(
        session.login(name, "pw").await,
        format!("Logged in as {}\n", name)
    );
    session
}

#[tokio::test]
async fn create_and_login_flow() {
    init_tracing();
    let store = MemStore::new();
    let mut session = Session::new(store.session());

    assert_eq!(
        session.create_customer("Alice", "pw", 1000).await,
        "Created user Alice\n"
    );
    assert_eq!(session.login("Alice", "wrong").await, "Login failed\n");
    assert_eq!(session.login("alice", "pw").await, "Logged in as alice\n");
    assert_eq!(session.login("alice", "pw").await, "User already logged in\n");
    assert_eq!(session.current_user(), Some("alice"));
}

#[tokio::test]
async fn negative_deposit_creates_nothing() {
    let store = MemStore::new();
    let mut session = Session::new(store.session());

    assert_eq!(
        session.create_customer("bob", "pw", -5).await,
        "Failed to create user\n"
    );
    assert_eq!(session.login("bob", "pw").await, "Login failed\n");
}

#[tokio::test]
async fn duplicate_username_is_rejected_case_insensitively() {
    let store = MemStore::new();
    let mut session = Session::new(store.session());

    assert_eq!(
        session.create_customer("Carol", "pw", 10).await,
        "Created user Carol\n"
    );
    assert_eq!(
        session.create_customer("CAROL", "other", 10).await,
        "Failed to create user\n"
    );
}

#[tokio::test]
async fn unknown_user_login_fails() {
    let store = MemStore::new();
    let mut session = Session::new(store.session());
    assert_eq!(session.login("ghost", "pw").await, "Login failed\n");
}

#[tokio::test]
async fn search_orders_direct_results_by_duration() {
    let store = store_with_flights(vec![
        flight(10, 5, "Seattle WA", "Boston MA", 300, 10, 500),
        flight(11, 5, "Seattle WA", "Boston MA", 120, 10, 200),
    ])
    .await;
    let mut session = Session::new(store.session());

    let out = session.search("Seattle WA", "Boston MA", true, 5, 3).await;
    let expected = "Itinerary 0: 1 flight(s), 120 minutes\n\
         ID: 11 Day: 5 Carrier: AS Number: 11 Origin: Seattle WA Dest: Boston MA Duration: 120 Capacity: 10 Price: 200\n\
         Itinerary 1: 1 flight(s), 300 minutes\n\
         ID: 10 Day: 5 Carrier: AS Number: 10 Origin: Seattle WA Dest: Boston MA Duration: 300 Capacity: 10 Price: 500\n";
    assert_eq!(out, expected);
}

#[tokio::test]
async fn search_without_matches_reports_it() {
    let store = MemStore::new();
    let mut session = Session::new(store.session());
    assert_eq!(
        session.search("Nowhere", "Elsewhere", false, 1, 5).await,
        "No flights match your selection\n"
    );
}

#[tokio::test]
async fn search_skips_canceled_flights() {
    let mut canceled = flight(20, 7, "Seattle WA", "Boston MA", 90, 10, 100);
    canceled.canceled = true;
    let store = store_with_flights(vec![
        canceled,
        flight(21, 7, "Seattle WA", "Boston MA", 200, 10, 100),
    ])
    .await;
    let mut session = Session::new(store.session());

    let out = session.search("Seattle WA", "Boston MA", true, 7, 5).await;
    assert!(out.contains("ID: 21"));
    assert!(!out.contains("ID: 20"));
}

#[tokio::test]
async fn connections_fill_the_remaining_limit() {
    let store = store_with_flights(vec![
        flight(30, 3, "Seattle WA", "Boston MA", 400, 10, 300),
        flight(31, 3, "Seattle WA", "Denver CO", 100, 10, 100),
        flight(32, 3, "Denver CO", "Boston MA", 120, 10, 100),
    ])
    .await;
    let mut session = Session::new(store.session());

    let direct_only = session.search("Seattle WA", "Boston MA", true, 3, 5).await;
    assert!(!direct_only.contains("2 flight(s)"));

    // The 220-minute connection sorts ahead of the 400-minute direct flight.
    let both = session.search("Seattle WA", "Boston MA", false, 3, 5).await;
    assert!(both.starts_with("Itinerary 0: 2 flight(s), 220 minutes\n"));
    assert!(both.contains("Itinerary 1: 1 flight(s), 400 minutes\n"));

    // With the limit exhausted by the direct rows, no connections appear.
    let capped = session.search("Seattle WA", "Boston MA", false, 3, 1).await;
    assert!(capped.contains("1 flight(s)"));
    assert!(!capped.contains("2 flight(s)"));
}

#[tokio::test]
async fn a_new_search_replaces_the_cache() {
    let store = store_with_flights(vec![flight(40, 2, "Seattle WA", "Boston MA", 100, 10, 100)])
        .await;
    let mut session = logged_in_session(&store, "dora", 1000).await;

    session.search("Seattle WA", "Boston MA", true, 2, 5).await;
    assert_eq!(
        session.search("Nowhere", "Elsewhere", true, 2, 5).await,
        "No flights match your selection\n"
    );
    assert_eq!(session.book(0).await, "No such itinerary 0\n");
}

#[tokio::test]
async fn booking_requires_login_and_a_cached_itinerary() {
    let store = store_with_flights(vec![flight(50, 4, "Seattle WA", "Boston MA", 100, 10, 100)])
        .await;
    let mut session = Session::new(store.session());

    assert_eq!(
        session.book(0).await,
        "Cannot book reservations, not logged in\n"
    );

    let mut session = logged_in_session(&store, "erin", 1000).await;
    assert_eq!(session.book(0).await, "No such itinerary 0\n");

    session.search("Seattle WA", "Boston MA", true, 4, 5).await;
    assert_eq!(session.book(5).await, "No such itinerary 5\n");
    assert_eq!(session.book(-1).await, "No such itinerary -1\n");
}

#[tokio::test]
async fn booking_twice_on_one_day_is_rejected() {
    let store = store_with_flights(vec![
        flight(60, 9, "Seattle WA", "Boston MA", 100, 10, 100),
        flight(61, 9, "Seattle WA", "Boston MA", 200, 10, 100),
    ])
    .await;
    let mut session = logged_in_session(&store, "frank", 1000).await;

    session.search("Seattle WA", "Boston MA", true, 9, 5).await;
    assert_eq!(
        session.book(0).await,
        "Booked flight(s), reservation ID: 1\n"
    );
    assert_eq!(
        session.book(1).await,
        "You cannot book two flights in the same day\n"
    );
    assert_eq!(store.reservation_count().await, 1);
}

#[tokio::test]
async fn booking_a_full_flight_fails_without_a_row() {
    let store = store_with_flights(vec![flight(70, 11, "Seattle WA", "Boston MA", 100, 1, 100)])
        .await;

    let mut first = logged_in_session(&store, "gail", 1000).await;
    first.search("Seattle WA", "Boston MA", true, 11, 5).await;
    assert_eq!(first.book(0).await, "Booked flight(s), reservation ID: 1\n");

    let mut second = logged_in_session(&store, "hank", 1000).await;
    second.search("Seattle WA", "Boston MA", true, 11, 5).await;
    assert_eq!(second.book(0).await, "Booking failed\n");
    assert_eq!(store.reservation_count().await, 1);
}

#[tokio::test]
async fn concurrent_bookings_cannot_oversell_the_last_seat() {
    init_tracing();
    let store = store_with_flights(vec![flight(80, 13, "Seattle WA", "Boston MA", 100, 1, 100)])
        .await;

    let mut s1 = logged_in_session(&store, "ivan", 1000).await;
    let mut s2 = logged_in_session(&store, "judy", 1000).await;
    s1.search("Seattle WA", "Boston MA", true, 13, 5).await;
    s2.search("Seattle WA", "Boston MA", true, 13, 5).await;

    let h1 = tokio::spawn(async move { s1.book(0).await });
    let h2 = tokio::spawn(async move { s2.book(0).await });
    let r1 = h1.await.unwrap();
    let r2 = h2.await.unwrap();

    let booked = [&r1, &r2]
        .iter()
        .filter(|r| r.starts_with("Booked flight(s)"))
        .count();
    assert_eq!(booked, 1, "exactly one booking must win: {:?} / {:?}", r1, r2);
    assert!(r1 == "Booking failed\n" || r2 == "Booking failed\n");
    assert_eq!(store.reservation_count().await, 1);
}
