//! HTTP routes. `POST /classify` takes a multipart upload with an image in
//! the `file` field and answers with the model's top predictions.

use super::protocol::{ClassifyResponse, UploadLimit};
use super::WebError;
use crate::classifier::Classifier;
use actix_multipart::Multipart;
use actix_web::{post, web, Responder};
use anyhow::anyhow;
use futures_util::TryStreamExt;
use tracing::*;

type Result<T> = std::result::Result<T, WebError>;

/// Name of the multipart field holding the image
pub const FILE_FIELD: &str = "file";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(classify);
}

/// Read the `file` field of a multipart upload into memory. Other fields are
/// skipped
async fn read_file_field(mut payload: Multipart, limit: Option<usize>) -> Result<Vec<u8>> {
    while let Some(mut field) = payload.try_next().await? {
        if field.content_disposition().get_name() != Some(FILE_FIELD) {
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            bytes.extend_from_slice(&chunk);
            if let Some(limit) = limit {
                if bytes.len() > limit {
                    return Err(anyhow!("uploaded file exceeds the {limit} byte limit").into());
                }
            }
        }
        return Ok(bytes);
    }

    Err(anyhow!("missing multipart field `{FILE_FIELD}`").into())
}

#[post("/classify")]
pub async fn classify(
    payload: Multipart,
    classifier: web::Data<Classifier>,
    limit: web::Data<UploadLimit>,
) -> Result<impl Responder> {
    info!("classify request received");

    let outcome = async {
        let image = read_file_field(payload, limit.0).await?;

        // Inference is CPU bound, keep it off the async workers
        let predictions = web::block(move || classifier.classify(&image)).await??;

        Ok::<_, WebError>(web::Json(ClassifyResponse { predictions }))
    }
    .await;

    if let Err(e) = &outcome {
        warn!("classification failed: {e}");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelSettings, TOP_N};
    use crate::labels::ClassIndex;
    use crate::server;
    use crate::util::test as fixtures;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use image::ImageOutputFormat;
    use serde_json::Value;
    use std::io::Write;

    const BOUNDARY: &str = "----classify-test-boundary";

    fn multipart(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, data) in parts {
            write!(
                body,
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"{name}\"; filename=\"upload\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .unwrap();
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        write!(body, "--{BOUNDARY}--\r\n").unwrap();
        body
    }

    fn upload(parts: &[(&str, &[u8])]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/classify")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart(parts))
    }

    async fn post_to(
        classifier: Classifier,
        req: test::TestRequest,
        limit: Option<usize>,
    ) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(classifier))
                .app_data(web::Data::new(UploadLimit(limit)))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(&app, req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }

    async fn post(req: test::TestRequest, limit: Option<usize>) -> (StatusCode, Value) {
        post_to(fixtures::classifier(), req, limit).await
    }

    fn error_message(body: &Value) -> &str {
        body["error"].as_str().expect("error field")
    }

    #[actix_web::test]
    async fn test_classify_any_format() {
        let images = [
            fixtures::encode(fixtures::gradient(640, 480), ImageOutputFormat::Png),
            fixtures::encode(fixtures::gradient(100, 900), ImageOutputFormat::Jpeg(80)),
            fixtures::encode(fixtures::gradient(224, 224), ImageOutputFormat::Bmp),
            fixtures::encode(fixtures::gradient(50, 60), ImageOutputFormat::Gif),
        ];

        for image in images {
            let (status, body) = post(upload(&[("file", &image)]), None).await;
            assert_eq!(status, StatusCode::OK);

            let predictions = body["predictions"].as_array().unwrap();
            assert_eq!(predictions.len(), TOP_N);
            let probabilities: Vec<f64> = predictions
                .iter()
                .map(|p| p["probability"].as_f64().unwrap())
                .collect();
            assert!(probabilities.windows(2).all(|w| w[0] >= w[1]));
            for p in predictions {
                assert!(p["label"].is_string());
                assert!(p["description"].is_string());
            }
        }
    }

    #[actix_web::test]
    async fn test_file_found_among_other_fields() {
        let image = fixtures::encode(fixtures::gradient(300, 300), ImageOutputFormat::Png);
        let (status, _) = post(upload(&[("note", b"hi"), ("file", &image)]), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_missing_file_field() {
        let (status, body) = post(upload(&[("image", b"whatever")]), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).contains("missing multipart field `file`"));

        let (status, body) = post(upload(&[]), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!error_message(&body).is_empty());
    }

    #[actix_web::test]
    async fn test_non_image_bytes() {
        let (status, body) = post(upload(&[("file", b"%PDF-1.4 not a picture")]), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).starts_with("cannot identify image file"));
    }

    #[actix_web::test]
    async fn test_not_multipart() {
        let req = test::TestRequest::post()
            .uri("/classify")
            .insert_header(header::ContentType::json())
            .set_payload(r#"{"file": "abc"}"#);
        let (status, body) = post(req, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!error_message(&body).is_empty());
    }

    #[actix_web::test]
    async fn test_identical_uploads_identical_predictions() {
        let image = fixtures::encode(fixtures::gradient(400, 300), ImageOutputFormat::Jpeg(90));
        let (_, first) = post(upload(&[("file", &image)]), None).await;
        let (_, second) = post(upload(&[("file", &image)]), None).await;
        assert_eq!(first, second);
    }

    #[actix_web::test]
    async fn test_upload_limit() {
        let image = fixtures::encode(fixtures::gradient(300, 300), ImageOutputFormat::Png);

        let (status, body) = post(upload(&[("file", &image)]), Some(64)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).contains("64 byte limit"));

        let (status, _) = post(upload(&[("file", &image)]), Some(image.len())).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_too_few_classes_is_an_error() {
        let classifier = Classifier::new(
            Box::new(fixtures::FixedScores(vec![0.3, 0.7])),
            ClassIndex::new(vec![("a".into(), "x".into()), ("b".into(), "y".into())]),
        );
        let image = fixtures::encode(fixtures::gradient(64, 64), ImageOutputFormat::Png);

        let (status, body) = post_to(classifier, upload(&[("file", &image)]), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_message(&body).contains("only 2 classes"));
    }

    #[actix_web::test]
    async fn test_cors_any_origin() {
        let app = test::init_service(
            App::new()
                .wrap(server::cors())
                .app_data(web::Data::new(fixtures::classifier()))
                .app_data(web::Data::new(UploadLimit::default()))
                .configure(configure),
        )
        .await;

        let image = fixtures::encode(fixtures::gradient(32, 32), ImageOutputFormat::Png);
        let req = upload(&[("file", &image)])
            .insert_header((header::ORIGIN, "http://somewhere.example"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[actix_web::test]
    #[ignore = "needs models/mobilenet_v2.pt and images/dog.jpg"]
    async fn test_dog_photo() {
        const DOG_TERMS: &[&str] = &[
            "retriever", "terrier", "hound", "spaniel", "shepherd", "poodle", "beagle",
            "collie", "corgi", "husky", "pug", "mastiff", "setter", "schnauzer", "dog",
        ];

        let classifier = Classifier::load(&ModelSettings::default()).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(classifier))
                .app_data(web::Data::new(UploadLimit::default()))
                .configure(configure),
        )
        .await;

        let image = std::fs::read("images/dog.jpg").unwrap();
        let resp = test::call_service(&app, upload(&[("file", &image)]).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        let top1 = body["predictions"][0]["description"]
            .as_str()
            .unwrap()
            .to_lowercase();
        assert!(DOG_TERMS.iter().any(|t| top1.contains(t)), "top-1 was {top1}");
    }
}
