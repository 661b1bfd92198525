// Upload pre-processing endpoints. All accept multipart bodies with one or more files.

use axum::{
    extract::{Multipart, Query, State},
    response::{IntoResponse, Json},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    error::{AppError, AppResult},
    image_processing::{
        self, CompressedImage, CompressionOptions, Dimensions, OutputFormat, UploadedFile,
        ValidationReport,
    },
};

// Per-request overrides of the configured compression options
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompressQuery {
    max_width: Option<u32>,
    max_height: Option<u32>,
    quality: Option<f32>,
    #[serde(rename = "maxSizeKB")]
    max_size_kb: Option<u32>,
    output_format: Option<OutputFormat>,
}

impl CompressQuery {
    fn apply(&self, base: CompressionOptions) -> CompressionOptions {
        CompressionOptions {
            max_width: self.max_width.unwrap_or(base.max_width),
            max_height: self.max_height.unwrap_or(base.max_height),
            quality: self.quality.unwrap_or(base.quality),
            max_size_kb: self.max_size_kb.unwrap_or(base.max_size_kb),
            output_format: self.output_format.unwrap_or(base.output_format),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationResult {
    name: String,
    #[serde(flatten)]
    report: ValidationReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompressedView {
    #[serde(flatten)]
    image: CompressedImage,
    size: usize,
    data_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompressResult {
    name: String,
    validation: ValidationReport,
    image: Option<CompressedView>,
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PreviewResult {
    name: String,
    data_url: String,
    #[serde(flatten)]
    dimensions: Dimensions,
}

// Collects every file part; non-file parts are ignored.
async fn read_files(mut multipart: Multipart) -> AppResult<Vec<UploadedFile>> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let declared = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload '{}': {}", name, e)))?;
        let content_type = declared
            .or_else(|| image_processing::sniff_mime_type(&bytes).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        files.push(UploadedFile::new(name, content_type, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".to_string()));
    }
    Ok(files)
}

pub async fn validate_uploads(
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let files = read_files(multipart).await?;
    tracing::info!("[HANDLER] /api/images/validate - {} file(s)", files.len());

    let options = app_state.settings.images.validation_options();
    let results: Vec<ValidationResult> = files
        .iter()
        .map(|file| ValidationResult {
            name: file.name.clone(),
            report: image_processing::validate(file, &options),
        })
        .collect();
    Ok(Json(results))
}

pub async fn compress_uploads(
    State(app_state): State<AppState>,
    Query(query): Query<CompressQuery>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let options = query.apply(app_state.settings.images.compression_options());
    options.validate()?;

    let files = read_files(multipart).await?;
    tracing::info!("[HANDLER] /api/images/compress - {} file(s), options: {:?}", files.len(), options);

    let validation_options = app_state.settings.images.validation_options();
    let jobs = files.into_iter().map(|file| {
        let validation = image_processing::validate(&file, &validation_options);
        async move {
            let name = file.name.clone();
            if !validation.is_valid {
                return CompressResult { name, validation, image: None, error: None };
            }
            match image_processing::compress(file, options).await {
                Ok(image) => CompressResult {
                    name,
                    validation,
                    image: Some(CompressedView { size: image.size(), data_url: image.data_url(), image }),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "Compression failed");
                    CompressResult { name, validation, image: None, error: Some(e.to_string()) }
                }
            }
        }
    });

    // Each file is an independent unit of work
    let results = join_all(jobs).await;
    Ok(Json(results))
}

pub async fn preview_uploads(multipart: Multipart) -> AppResult<impl IntoResponse> {
    let files = read_files(multipart).await?;
    tracing::info!("[HANDLER] /api/images/preview - {} file(s)", files.len());

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let dimensions = image_processing::dimensions(&file).await?;
        let name = file.name.clone();
        let data_url = image_processing::preview(file).await?;
        results.push(PreviewResult { name, data_url, dimensions });
    }
    Ok(Json(results))
}
