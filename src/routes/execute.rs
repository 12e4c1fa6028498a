use actix_web::{HttpResponse, Responder, post, web};
use serde::{Deserialize, Serialize};

use super::ErrorResponse;
use crate::sandbox::{EngineError, ScriptRunner};

#[derive(Deserialize, Debug)]
pub struct ExecuteRequest {
    pub code: Option<String>,
}

/// Body of a script that timed out or could not be run at all
#[derive(Serialize)]
struct ExecutionFailure {
    error: String,
    output: String,
    exit_code: i32,
    execution_time: f64,
}

#[post("/api/execute")]
pub async fn execute_handler(
    runner: web::Data<ScriptRunner>,
    body: web::Json<ExecuteRequest>,
) -> impl Responder {
    let Some(code) = body.into_inner().code else {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "No code provided".to_string(),
        });
    };

    match runner.execute(&code).await {
        Ok(result) if result.timed_out => HttpResponse::RequestTimeout().json(ExecutionFailure {
            error: result.error,
            output: String::new(),
            exit_code: -1,
            execution_time: result.execution_time,
        }),
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            log::error!("Script execution failed: {e}");
            let error = match e {
                EngineError::Io(e) => format!("Execution error: {e}"),
                other => format!("Server error: {other}"),
            };
            HttpResponse::InternalServerError().json(ExecutionFailure {
                error,
                output: String::new(),
                exit_code: -1,
                execution_time: 0.0,
            })
        }
    }
}
