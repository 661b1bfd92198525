//! Router-level tests: requests go through the real axum router with an
//! in-memory inventory, a canned rate provider and an in-memory rate cache.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use autoexport_rust::config::Settings;
use autoexport_rust::exchange_rate::{
    ExchangeRateService, MemoryRateStore, RateFetchError, RateProvider,
};
use autoexport_rust::models::VehicleRecord;
use autoexport_rust::{AppState, routes};
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

struct CannedProvider {
    rate: Option<f64>,
    calls: AtomicUsize,
}

#[async_trait]
impl RateProvider for CannedProvider {
    async fn fetch_rate(&self) -> Result<f64, RateFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rate.ok_or(RateFetchError::MissingRate)
    }
}

fn vehicles() -> Vec<VehicleRecord> {
    serde_json::from_str(
        r#"[
            {"stock":"A1","make":"Toyota","model":"Prius","type":"Hatchback","year":2019,"price":8000,"fuel":"Hybrid"},
            {"stock":"A2","make":"Honda","model":"Fit","type":"Hatchback","year":2021,"price":15000,"fuel":"Petrol"},
            {"stock":"A3","make":"Mazda","model":"CX-5","type":"SUV","year":2018,"price":14800,"fuel":"Diesel"}
        ]"#,
    )
    .unwrap()
}

fn app_with_rate(rate: Option<f64>) -> Router {
    let provider = Arc::new(CannedProvider { rate, calls: AtomicUsize::new(0) });
    let service = Arc::new(ExchangeRateService::new(
        provider,
        Arc::new(MemoryRateStore::default()),
        std::time::Duration::from_secs(3600),
        142.08,
    ));
    routes::create_router(AppState::new(Settings::default(), vehicles(), service))
}

fn app() -> Router {
    app_with_rate(Some(150.0))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn multipart_request(uri: &str, files: &[(&str, &str, Vec<u8>)]) -> Request<Body> {
    let boundary = "autoexport-test-boundary";
    let mut body = Vec::new();
    for (name, content_type, bytes) in files {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 128]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_vehicles_without_criteria_returns_all() {
        let (status, body) = get_json(app(), "/api/vehicles").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["count"], 3);
    }

    #[tokio::test]
    async fn test_list_vehicles_with_query_criteria() {
        let (status, body) = get_json(app(), "/api/vehicles?make=toyota&yearFrom=").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["vehicles"][0]["stock"], "A1");
    }

    #[tokio::test]
    async fn test_search_vehicles_with_json_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/vehicles/search")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"yearFrom": 2020}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["vehicles"][0]["make"], "Honda");
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let (status, body) = get_json(app(), "/api/vehicles?yearFrom=2025").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["count"], 0);
        assert_eq!(body["vehicles"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_facets() {
        let (status, body) = get_json(app(), "/api/facets").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["make"], serde_json::json!(["Honda", "Mazda", "Toyota"]));
        assert_eq!(body["year"], serde_json::json!([2018, 2019, 2021]));

        let (status, body) = get_json(app(), "/api/facets/type").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["Hatchback", "SUV"]));

        let (status, _) = get_json(app(), "/api/facets/colour").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exchange_rate_live() {
        let (status, body) = get_json(app(), "/api/exchange-rate").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rate"], 150.0);
        assert_eq!(body["source"], "live");
        assert_eq!(body["error"], Value::Null);
    }

    #[tokio::test]
    async fn test_exchange_rate_falls_back_to_default() {
        let (status, body) = get_json(app_with_rate(None), "/api/exchange-rate").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rate"], 142.08);
        assert_eq!(body["source"], "default");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_convert_both_directions() {
        let (status, body) = get_json(app(), "/api/exchange-rate/convert?amount=8000").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["converted"], 1_200_000.0);
        assert_eq!(body["to"], "JPY");
        assert_eq!(body["formattedAmount"], "$8,000.00");
        assert_eq!(body["formattedConverted"], "¥1,200,000");

        let (_, body) = get_json(app(), "/api/exchange-rate/convert?amount=1000&from=JPY").await;
        assert_eq!(body["converted"], 6.67);
        assert_eq!(body["formattedConverted"], "$6.67");
    }

    #[tokio::test]
    async fn test_validate_upload_reports_errors() {
        let request = multipart_request(
            "/api/images/validate",
            &[("car.png", "image/png", png(4, 4)), ("notes.txt", "text/plain", b"hello".to_vec())],
        );
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body[0]["isValid"], true);
        assert_eq!(body[1]["isValid"], false);
        assert_eq!(body[1]["name"], "notes.txt");
        assert_eq!(body[1]["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_compress_upload() {
        let request = multipart_request(
            "/api/images/compress?maxWidth=80&maxHeight=60&maxSizeKB=200",
            &[("big.png", "image/png", png(200, 150)), ("bad.gif", "image/gif", vec![0; 8])],
        );
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        let first = &body[0];
        assert_eq!(first["image"]["width"], 80);
        assert_eq!(first["image"]["height"], 60);
        assert_eq!(first["image"]["name"], "big.jpg");
        assert!(first["image"]["dataUrl"].as_str().unwrap().starts_with("data:image/jpeg;base64,"));

        let second = &body[1];
        assert_eq!(second["validation"]["isValid"], false);
        assert_eq!(second["image"], Value::Null);
    }

    #[tokio::test]
    async fn test_compress_rejects_bad_options() {
        let request =
            multipart_request("/api/images/compress?quality=1.5", &[("a.png", "image/png", png(4, 4))]);
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_preview_upload() {
        let request = multipart_request("/api/images/preview", &[("p.png", "image/png", png(10, 6))]);
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body[0]["width"], 10);
        assert_eq!(body[0]["height"], 6);
        assert!(body[0]["dataUrl"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_preview_undecodable_is_unprocessable() {
        let request =
            multipart_request("/api/images/preview", &[("p.png", "image/png", b"garbage".to_vec())]);
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_stock_page_renders_filtered_rows() {
        let response = app()
            .oneshot(Request::builder().uri("/stock?fuel=diesel").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
        assert!(html.contains("Showing 1 of 3 vehicles"));
        assert!(html.contains("CX-5"));
        assert!(html.contains("¥2,220,000"));
        assert!(!html.contains("Prius"));
    }

    #[tokio::test]
    async fn test_landing_page_lists_makes() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
        assert!(html.contains("3 vehicles currently in stock"));
        assert!(html.contains("/stock?make=Mazda"));
    }
}
