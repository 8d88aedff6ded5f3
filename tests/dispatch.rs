use std::time::Duration;

use http::{Method, StatusCode};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hclient::{ClientBuilder, Dispatcher, ErrorKind, Request};

fn request(server: &MockServer, path: &str) -> Request {
    Request::builder()
        .url(format!("{}{path}", server.uri()).parse::<url::Url>().unwrap())
        .id("dispatch-test")
        .build()
}

#[tokio::test]
async fn test_dispatched_get_delivers_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("dispatched"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ClientBuilder::default().client().unwrap();
    let dispatcher = Dispatcher::new(2, 8);

    let request = request(&server, "/");
    let unit = dispatcher
        .submit("req-1", move |token| async move {
            client.execute(Method::GET, request, token).await
        })
        .await
        .unwrap();
    assert_eq!(unit.id(), "req-1");

    let response = unit.wait().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), "dispatched");
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_unit_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/never"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = ClientBuilder::default().client().unwrap();
    let dispatcher = Dispatcher::new(1, 8);

    // Occupy the single worker so the cancelled unit stays queued
    let blocker = dispatcher
        .submit("blocker", |_token| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Err(ErrorKind::Cancelled)
        })
        .await
        .unwrap();

    let request = request(&server, "/never");
    let unit = dispatcher
        .submit("doomed", move |token| async move {
            client.execute(Method::GET, request, token).await
        })
        .await
        .unwrap();

    assert!(unit.cancel());
    assert!(unit.is_cancelled());
    let err = unit.wait().await.unwrap_err();
    assert!(matches!(err, ErrorKind::Cancelled));

    let _ = blocker.wait().await;
    dispatcher.shutdown().await;
    // Dropping the server verifies the expect(0) above
}

#[tokio::test]
async fn test_in_flight_cancellation_stops_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = ClientBuilder::builder()
        .max_retries(20_u64)
        .retry_wait_min(Duration::from_millis(100))
        .retry_wait_max(Duration::from_millis(200))
        .build()
        .client()
        .unwrap();
    let dispatcher = Dispatcher::new(1, 8);

    let request = request(&server, "/");
    let unit = dispatcher
        .submit("retrying", move |token| async move {
            client.execute(Method::GET, request, token).await
        })
        .await
        .unwrap();

    // Let a couple of attempts happen, then pull the plug
    tokio::time::sleep(Duration::from_millis(150)).await;
    unit.cancel();

    let err = unit.wait().await.unwrap_err();
    assert!(matches!(err, ErrorKind::Cancelled));
    assert!(server.received_requests().await.unwrap().len() < 21);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_submissions_fan_out_across_workers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .expect(4)
        .mount(&server)
        .await;

    let client = ClientBuilder::default().client().unwrap();
    let dispatcher = Dispatcher::new(4, 8);

    let start = std::time::Instant::now();
    let mut units = Vec::new();
    for i in 0..4 {
        let client = client.clone();
        let request = request(&server, "/");
        let unit = dispatcher
            .submit(format!("req-{i}"), move |token| async move {
                client.execute(Method::GET, request, token).await
            })
            .await
            .unwrap();
        units.push(unit);
    }
    for unit in units {
        assert!(unit.wait().await.is_ok());
    }

    // Four workers run the four delayed requests in parallel; serial
    // execution would take at least 400ms.
    assert!(start.elapsed() < Duration::from_millis(350));
    dispatcher.shutdown().await;
}
