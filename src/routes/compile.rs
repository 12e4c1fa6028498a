use actix_web::{HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};

use super::{ErrorResponse, FailureResponse};
use crate::sandbox::compile::{COMPILE_TIMEOUT, RUN_TIMEOUT};
use crate::sandbox::{CompilerPipeline, CompilerStatus, EngineError, PipelineOutcome, RunMode};

#[derive(Deserialize, Debug)]
pub struct CompileRequest {
    pub code: Option<String>,
    /// Input lines; numbers are accepted and used in their JSON text form
    #[serde(default)]
    pub inputs: Vec<serde_json::Value>,
}

#[derive(Serialize, Default)]
struct CompileResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compilation_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    needs_input: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum CompilerCheckResponse {
    Available { available: bool, version: String },
    Unavailable { available: bool, error: String },
}

#[post("/api/compile-c")]
pub async fn compile_c_handler(
    pipeline: web::Data<CompilerPipeline>,
    body: web::Json<CompileRequest>,
) -> impl Responder {
    let Some(code) = body.into_inner().code else {
        return missing_code();
    };

    let outcome = pipeline.run(&code, RunMode::Batch).await;
    respond(outcome, false)
}

#[post("/api/compile-c-with-input")]
pub async fn compile_c_with_input_handler(
    pipeline: web::Data<CompilerPipeline>,
    body: web::Json<CompileRequest>,
) -> impl Responder {
    let CompileRequest { code, inputs } = body.into_inner();
    let Some(code) = code else {
        return missing_code();
    };

    let inputs: Vec<String> = inputs.iter().map(input_line).collect();
    let outcome = pipeline.run(&code, RunMode::WithInputs(&inputs)).await;
    respond(outcome, true)
}

#[get("/api/check-c-compiler")]
pub async fn check_c_compiler_handler(pipeline: web::Data<CompilerPipeline>) -> impl Responder {
    let response = match pipeline.probe().await {
        CompilerStatus::Available { version } => CompilerCheckResponse::Available {
            available: true,
            version,
        },
        CompilerStatus::Unavailable { error } => {
            log::warn!("Compiler check failed: {error}");
            CompilerCheckResponse::Unavailable {
                available: false,
                error,
            }
        }
    };
    HttpResponse::Ok().json(response)
}

fn missing_code() -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "No C code provided".to_string(),
    })
}

/// One stdin line from a JSON input value
fn input_line(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn respond(outcome: Result<PipelineOutcome, EngineError>, with_inputs: bool) -> HttpResponse {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(EngineError::InvalidInput(error)) => {
            return HttpResponse::BadRequest().json(ErrorResponse { error });
        }
        Err(e) => {
            log::error!("Compile pipeline failed: {e}");
            return HttpResponse::InternalServerError()
                .json(FailureResponse::new(format!("Server error: {e}")));
        }
    };

    match outcome {
        PipelineOutcome::Completed {
            output,
            error_output,
            return_code,
        } => HttpResponse::Ok().json(CompileResponse {
            success: true,
            output: Some(output),
            error_output: Some(error_output),
            return_code: Some(return_code),
            ..Default::default()
        }),
        PipelineOutcome::CompileFailed { diagnostics } => {
            HttpResponse::BadRequest().json(CompileResponse {
                error: Some("Compilation failed".to_string()),
                compilation_error: Some(diagnostics),
                ..Default::default()
            })
        }
        PipelineOutcome::CompileTimedOut => HttpResponse::BadRequest().json(FailureResponse::new(
            format!("Compilation timed out ({} seconds)", COMPILE_TIMEOUT.as_secs()),
        )),
        PipelineOutcome::RunTimedOut => {
            let mut error = format!(
                "Program execution timed out ({} seconds)",
                RUN_TIMEOUT.as_secs()
            );
            if !with_inputs {
                error.push_str(". This may be due to scanf() waiting for input.");
            }
            HttpResponse::BadRequest().json(FailureResponse::new(error))
        }
        PipelineOutcome::NeedsInput {
            output,
            error_output,
        } => HttpResponse::BadRequest().json(CompileResponse {
            error: Some("Program requires interactive input (scanf).".to_string()),
            needs_input: Some(true),
            output: Some(output),
            error_output: Some(error_output),
            message: Some(
                "This program uses scanf() for input. Please provide input values in the frontend."
                    .to_string(),
            ),
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_line_formats_json_values() {
        assert_eq!(input_line(&json!("3")), "3");
        assert_eq!(input_line(&json!(4)), "4");
        assert_eq!(input_line(&json!(2.5)), "2.5");
        assert_eq!(input_line(&json!("two words")), "two words");
    }
}
