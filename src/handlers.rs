use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse, Responder};
use log::{info, warn};
use serde::Serialize;
use utoipa::ToSchema;

use crate::batch::Delivery;
use crate::error::SlipError;
use crate::state::AppState;
use crate::upload::StagedUpload;
use crate::ErrorResponse;

#[derive(Debug, ToSchema)]
pub struct GenerateSlipsRequest {
    /// Spreadsheet with one employee per row (xlsx, xlsm, xlsb, xls, ods or csv).
    #[allow(unused)]
    pub file: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub delivery: String,
    pub strategy: String,
}

#[utoipa::path(
    context_path = "/api",
    tag = "Salary Slips",
    post,
    path = "/generate",
    request_body(content = inline(GenerateSlipsRequest), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Combined slips or index page (text/html), or a zip archive (application/zip)"),
        (status = 400, description = "Missing, unsupported, invalid or empty upload", body = ErrorResponse),
        (status = 500, description = "Rendering or packaging failed", body = ErrorResponse)
    )
)]
pub async fn generate_slips(payload: Multipart, data: web::Data<AppState>) -> HttpResponse {
    info!("Executing generate_slips handler");

    let upload =
        match StagedUpload::from_multipart(payload, &data.upload_dir, data.max_upload_bytes).await {
            Ok(upload) => upload,
            Err(e) => {
                warn!("Rejected upload: {}", e);
                return e.into();
            }
        };

    match data.pipeline.process(upload).await {
        Ok(delivery) => delivery_response(delivery).await,
        Err(e) => e.into(),
    }
}

async fn delivery_response(delivery: Delivery) -> HttpResponse {
    match delivery {
        Delivery::Document { html, units } => {
            info!("Returning combined document with {} slip(s)", units);
            html_response(html)
        }
        Delivery::Index { html, dir, units } => {
            info!("Returning index of {} slip(s) stored in {:?}", units.len(), dir);
            html_response(html)
        }
        Delivery::Archive(download) => {
            let file_name = download.file_name().to_string();
            info!(
                "Streaming archive '{}' with {} entr(y/ies)",
                file_name,
                download.entries()
            );
            match download.into_stream().await {
                Ok(stream) => HttpResponse::Ok()
                    .content_type("application/zip")
                    .insert_header(ContentDisposition {
                        disposition: DispositionType::Attachment,
                        parameters: vec![DispositionParam::Filename(file_name)],
                    })
                    .streaming(stream),
                Err(e) => SlipError::from(e).into(),
            }
        }
    }
}

fn html_response(html: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Salary Slips",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(data: web::Data<AppState>) -> impl Responder {
    let config = data.pipeline.config();
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        delivery: config.delivery.as_str().to_string(),
        strategy: config.strategy.as_str().to_string(),
    })
}

/// Routes mounted under `/api`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/generate").route(web::post().to(generate_slips)));
}
