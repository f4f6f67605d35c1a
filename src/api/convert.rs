//! Upload conversion endpoints
//!
//! Every handler follows the same shape: spool the multipart form, check
//! the parameters, then hand the tool call to the [`ConversionInvoker`]
//! which mirrors progress into the registry under the form's `task_id`.
//! The converted file is streamed back and all scratch files are removed
//! when the response body is dropped.
//!
//! [`ConversionInvoker`]: crate::progress::ConversionInvoker

use std::future::Future;
use std::path::PathBuf;

use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    response::Response,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    models::OcrResponse,
    state::AppState,
    utils::{TempArtifacts, UploadForm, content_type_for, display_stem, file_response, scratch_path},
    validation,
};
use crate::api::error::ApiError;
use crate::progress::{ProgressRecord, TaskId, TaskProgress};
use crate::tools::archive::{self, ArchiveEntry};
use crate::tools::convert::Optimization;
use crate::tools::{ToolError, ToolRunner, convert};

async fn read_form(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadForm, ApiError> {
    UploadForm::read(multipart?, &state.config.server.temp_dir).await
}

fn require_files(form: &UploadForm) -> Result<(), ApiError> {
    if form.files.is_empty() {
        return Err(ApiError::InvalidInput("No file provided".to_string()));
    }
    Ok(())
}

/// Progress share of item `index` out of `total` within the 10..80 band
fn batch_progress(index: usize, total: usize) -> u8 {
    let step = index * 70 / total.max(1);
    (10 + step).min(80) as u8
}

/// One uploaded file through one tool call
///
/// `convert` receives the runner, the spooled input and the path it must
/// write; the response is named after the upload with the new extension.
async fn run_single<F, Fut>(
    state: &AppState,
    mut form: UploadForm,
    format: String,
    label: &str,
    convert: F,
) -> Result<Response, ApiError>
where
    F: FnOnce(ToolRunner, PathBuf, PathBuf) -> Fut,
    Fut: Future<Output = Result<(), ToolError>>,
{
    let upload = form.single_file()?;
    let task_id = form.task_id()?;
    let mut artifacts = std::mem::take(&mut form.artifacts);

    let download_name = format!("{}.{format}", display_stem(&upload.original_name));
    let output = scratch_path(&state.config.server.temp_dir, &download_name);
    artifacts.track(output.clone());

    let tools = state.tools.clone();
    let target = output.clone();
    let converting = format!("Converting {label}...");

    state
        .invoker
        .run(
            task_id.clone(),
            ProgressRecord::processing(10, "Preparing conversion..."),
            "Conversion complete",
            |progress: TaskProgress| async move {
                progress.processing(30, converting);
                convert(tools, upload.path, target).await?;
                progress.processing(90, "Finalizing...");
                Ok::<_, ToolError>(())
            },
        )
        .await?;

    file_response(
        &output,
        &download_name,
        content_type_for(&format),
        artifacts,
        task_id.as_ref(),
    )
    .await
}

/// POST /api/image/convert
///
/// Several files come back as one zip archive. A missing `task_id` is
/// replaced with a generated one, returned in `X-Task-ID`.
#[instrument(skip_all)]
pub async fn convert_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut form = read_form(&state, multipart).await?;
    require_files(&form)?;

    let requested = validation::output_format(form.field("format"), "png")?;
    let format = convert::normalize_image_format(&requested)?;
    let resize = validation::dimensions(form.field("width"), form.field("height"))?;
    let quality = validation::quality(form.field("quality"))?;
    let task_id = form.task_id()?.unwrap_or_else(TaskId::generate);

    let scratch = state.config.server.temp_dir.clone();
    let mut artifacts = std::mem::take(&mut form.artifacts);
    let uploads = form.files;
    let tools = state.tools.clone();

    if let [upload] = uploads.as_slice() {
        let upload = upload.clone();
        let download_name = format!("{}.{requested}", display_stem(&upload.original_name));
        let output = scratch_path(&scratch, &download_name);
        artifacts.track(output.clone());

        let target = output.clone();
        let target_format = format.clone();
        state
            .invoker
            .run(
                Some(task_id.clone()),
                ProgressRecord::processing(30, "Converting image..."),
                "Conversion complete",
                |progress: TaskProgress| async move {
                    convert::convert_image(&tools, &upload.path, &target, &target_format, resize, quality)
                        .await?;
                    progress.processing(60, "Processing conversion...");
                    Ok::<_, ToolError>(())
                },
            )
            .await?;

        return file_response(
            &output,
            &download_name,
            content_type_for(&format),
            artifacts,
            Some(&task_id),
        )
        .await;
    }

    let total = uploads.len();
    let work_dir = scratch.join(format!("batch_{}", Uuid::new_v4()));
    artifacts.track_dir(work_dir.clone());
    let download_name = format!("converted_images_{requested}.zip");
    let bundle_path = scratch_path(&scratch, &download_name);
    artifacts.track(bundle_path.clone());

    let target = bundle_path.clone();
    state
        .invoker
        .run(
            Some(task_id.clone()),
            ProgressRecord::processing(10, format!("Converting {total} images...")),
            "Conversion complete",
            |progress: TaskProgress| async move {
                tokio::fs::create_dir_all(&work_dir).await?;

                let mut entries = Vec::with_capacity(total);
                for (index, upload) in uploads.iter().enumerate() {
                    progress.processing(
                        batch_progress(index, total),
                        format!("Converting {}/{total}...", index + 1),
                    );
                    let name = format!("{}.{requested}", display_stem(&upload.original_name));
                    let output = work_dir.join(format!("{index}_{name}"));
                    convert::convert_image(&tools, &upload.path, &output, &format, resize, quality).await?;
                    entries.push(ArchiveEntry { name, path: output });
                }

                progress.processing(85, "Creating archive...");
                archive::bundle(entries, target).await
            },
        )
        .await?;

    file_response(
        &bundle_path,
        &download_name,
        content_type_for("zip"),
        artifacts,
        Some(&task_id),
    )
    .await
}

/// POST /api/audio/convert
pub async fn convert_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let format = validation::output_format(form.field("format"), "mp3")?;
    let bitrate = validation::bitrate(form.field("bitrate"))?;

    run_single(&state, form, format, "audio", |tools, input, output| async move {
        convert::convert_audio(&tools, &input, &output, &bitrate).await
    })
    .await
}

/// POST /api/video/convert
pub async fn convert_video(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let format = validation::output_format(form.field("format"), "mp4")?;

    run_single(&state, form, format, "video", |tools, input, output| async move {
        convert::convert_video(&tools, &input, &output).await
    })
    .await
}

/// POST /api/video/to-gif
pub async fn video_to_gif(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let fps = validation::fps(form.field("fps"))?;
    let scale = validation::dimensions(form.field("width"), form.field("height"))?;

    run_single(&state, form, "gif".to_string(), "video to GIF", move |tools, input, output| async move {
        convert::video_to_gif(&tools, &input, &output, fps, scale).await
    })
    .await
}

/// POST /api/office/convert
pub async fn convert_office(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let format = validation::output_format(form.field("format"), "pdf")?;
    office_documents(&state, form, format).await
}

/// POST /api/office/to-pdf
pub async fn office_to_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    office_documents(&state, form, "pdf".to_string()).await
}

/// POST /api/presentation/convert
pub async fn convert_presentation(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let format = validation::output_format(form.field("format"), "pdf")?;
    office_documents(&state, form, format).await
}

/// POST /api/spreadsheet/convert
pub async fn convert_spreadsheet(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let format = validation::output_format(form.field("format"), "xlsx")?;
    office_documents(&state, form, format).await
}

/// LibreOffice picks its own output names, so each run gets a private
/// output directory that goes away with the response
async fn office_documents(
    state: &AppState,
    mut form: UploadForm,
    format: String,
) -> Result<Response, ApiError> {
    let task_id = form.task_id()?;
    let mut artifacts = std::mem::take(&mut form.artifacts);
    let uploads = form.files;
    let total = uploads.len();

    let scratch = state.config.server.temp_dir.clone();
    let out_dir = scratch.join(format!("office_{}", Uuid::new_v4()));
    artifacts.track_dir(out_dir.clone());

    let download_name = match uploads.as_slice() {
        [upload] => format!("{}.{format}", display_stem(&upload.original_name)),
        _ => format!("converted_document_{format}.zip"),
    };
    let bundle_path = scratch_path(&scratch, &download_name);
    if total > 1 {
        artifacts.track(bundle_path.clone());
    }

    let tools = state.tools.clone();
    let target_format = format.clone();
    let bundle_target = bundle_path.clone();
    let output = state
        .invoker
        .run(
            task_id.clone(),
            ProgressRecord::processing(10, "Converting document..."),
            "Conversion complete",
            |progress: TaskProgress| async move {
                let mut entries = Vec::with_capacity(total);
                for (index, upload) in uploads.iter().enumerate() {
                    if total > 1 {
                        progress.processing(
                            batch_progress(index, total),
                            format!("Converting {}/{total}...", index + 1),
                        );
                    }
                    let path = convert::convert_office(&tools, &upload.path, &out_dir, &target_format).await?;
                    entries.push(ArchiveEntry {
                        name: format!("{}.{target_format}", display_stem(&upload.original_name)),
                        path,
                    });
                }

                match entries.pop() {
                    Some(entry) if entries.is_empty() => Ok(entry.path),
                    Some(last) => {
                        entries.push(last);
                        progress.processing(85, "Creating archive...");
                        archive::bundle(entries, bundle_target.clone()).await?;
                        Ok(bundle_target)
                    }
                    None => Err(ToolError::UnsupportedFormat("No file provided".to_string())),
                }
            },
        )
        .await?;

    let content_type = if total > 1 {
        content_type_for("zip")
    } else {
        content_type_for(&format)
    };

    file_response(&output, &download_name, content_type, artifacts, task_id.as_ref()).await
}

/// POST /api/ebook/convert
pub async fn convert_ebook(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let format = validation::output_format(form.field("format"), "epub")?;

    run_single(&state, form, format, "e-book", |tools, input, output| async move {
        convert::convert_ebook(&tools, &input, &output).await
    })
    .await
}

/// POST /api/vector/convert
pub async fn convert_vector(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let format = validation::output_format(form.field("format"), "svg")?;
    let target_format = format.clone();

    run_single(&state, form, format, "vector graphic", |tools, input, output| async move {
        convert::convert_vector(&tools, &input, &output, &target_format).await
    })
    .await
}

/// POST /api/font/convert
pub async fn convert_font(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let format = validation::output_format(form.field("format"), "ttf")?;

    run_single(&state, form, format, "font", |tools, input, output| async move {
        convert::convert_font(&tools, &input, &output).await
    })
    .await
}

/// POST /api/image/to-pdf
///
/// Every uploaded image becomes one page, in upload order.
pub async fn images_to_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut form = read_form(&state, multipart).await?;
    require_files(&form)?;
    let task_id = form.task_id()?;
    let mut artifacts = std::mem::take(&mut form.artifacts);

    let download_name = match form.files.as_slice() {
        [upload] => format!("{}.pdf", display_stem(&upload.original_name)),
        _ => "images.pdf".to_string(),
    };
    let output = scratch_path(&state.config.server.temp_dir, &download_name);
    artifacts.track(output.clone());

    let inputs: Vec<PathBuf> = form.files.into_iter().map(|upload| upload.path).collect();
    let tools = state.tools.clone();
    let target = output.clone();
    state
        .invoker
        .run(
            task_id.clone(),
            ProgressRecord::processing(10, format!("Converting {} images to PDF...", inputs.len())),
            "Conversion complete",
            |_progress: TaskProgress| async move { convert::images_to_pdf(&tools, &inputs, &target).await },
        )
        .await?;

    file_response(&output, &download_name, content_type_for("pdf"), artifacts, task_id.as_ref()).await
}

/// POST /api/pdf/to-images
///
/// Pages come back as a zip of `{name}_page{N}.{format}` images.
#[instrument(skip_all)]
pub async fn pdf_to_images(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut form = read_form(&state, multipart).await?;
    let upload = form.single_file()?;
    let format = convert::normalize_image_format(&validation::output_format(form.field("format"), "png")?)?;
    let dpi = validation::dpi(form.field("dpi"))?;
    let task_id = form.task_id()?;
    let mut artifacts = std::mem::take(&mut form.artifacts);

    let scratch = state.config.server.temp_dir.clone();
    let pages_dir = scratch.join(format!("pdfimg_{}", Uuid::new_v4()));
    artifacts.track_dir(pages_dir.clone());
    let stem = display_stem(&upload.original_name);
    let download_name = format!("{stem}_pages.zip");
    let bundle_path = scratch_path(&scratch, &download_name);
    artifacts.track(bundle_path.clone());

    let tools = state.tools.clone();
    let target = bundle_path.clone();
    state
        .invoker
        .run(
            task_id.clone(),
            ProgressRecord::processing(10, "Rendering pages..."),
            "Conversion complete",
            |progress: TaskProgress| async move {
                let pages = convert::pdf_to_images(&tools, &upload.path, &pages_dir, dpi, &format).await?;

                progress.processing(85, "Creating archive...");
                let entries = pages
                    .into_iter()
                    .enumerate()
                    .map(|(index, path)| ArchiveEntry {
                        name: format!("{stem}_page{}.{format}", index + 1),
                        path,
                    })
                    .collect();
                archive::bundle(entries, target).await
            },
        )
        .await?;

    file_response(
        &bundle_path,
        &download_name,
        content_type_for("zip"),
        artifacts,
        task_id.as_ref(),
    )
    .await
}

/// POST /api/optimize/{tool}
///
/// `tool` is one of `compress-png`, `compress-jpg`, `compress-jpeg` or
/// `compress-pdf`.
#[instrument(skip_all)]
pub async fn optimize_file(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let optimization = Optimization::parse(&tool)?;
    let mut form = read_form(&state, multipart).await?;
    let upload = form.single_file()?;
    let task_id = form.task_id()?;
    let mut artifacts = std::mem::take(&mut form.artifacts);

    let extension = optimization.extension();
    let download_name = format!("compressed_{}.{extension}", display_stem(&upload.original_name));
    let output = scratch_path(&state.config.server.temp_dir, &download_name);
    artifacts.track(output.clone());

    let tools = state.tools.clone();
    let target = output.clone();
    state
        .invoker
        .run(
            task_id.clone(),
            ProgressRecord::processing(20, "Optimizing file..."),
            "Compression complete",
            |progress: TaskProgress| async move {
                progress.processing(60, "Compressing...");
                convert::optimize(&tools, optimization, &upload.path, &target).await
            },
        )
        .await?;

    file_response(
        &output,
        &download_name,
        content_type_for(extension),
        artifacts,
        task_id.as_ref(),
    )
    .await
}

/// POST /api/ocr/image
pub async fn ocr_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResponse>, ApiError> {
    let mut form = read_form(&state, multipart).await?;
    let upload = form.single_file()?;
    let lang = validation::ocr_language(form.field("lang"))?;
    let task_id = form.task_id()?;
    let _artifacts: TempArtifacts = std::mem::take(&mut form.artifacts);

    let tools = state.tools.clone();
    let text = state
        .invoker
        .run(
            task_id,
            ProgressRecord::processing(20, "Recognizing text..."),
            "Text extraction complete",
            |_progress: TaskProgress| async move {
                convert::image_to_text(&tools, &upload.path, &lang).await
            },
        )
        .await?;

    Ok(Json(OcrResponse {
        text: text.trim().to_string(),
    }))
}

/// POST /api/ocr/pdf
pub async fn ocr_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResponse>, ApiError> {
    let mut form = read_form(&state, multipart).await?;
    let upload = form.single_file()?;
    let lang = validation::ocr_language(form.field("lang"))?;
    let task_id = form.task_id()?;
    let mut artifacts = std::mem::take(&mut form.artifacts);

    let pages_dir = state
        .config
        .server
        .temp_dir
        .join(format!("ocr_{}", Uuid::new_v4()));
    artifacts.track_dir(pages_dir.clone());

    let tools = state.tools.clone();
    let text = state
        .invoker
        .run(
            task_id,
            ProgressRecord::processing(20, "Recognizing text..."),
            "Text extraction complete",
            |_progress: TaskProgress| async move {
                convert::pdf_to_text(&tools, &upload.path, &pages_dir, &lang).await
            },
        )
        .await?;

    Ok(Json(OcrResponse {
        text: text.trim().to_string(),
    }))
}
