mod compile;
mod execute;
mod health;
mod packages;

pub use compile::{check_c_compiler_handler, compile_c_handler, compile_c_with_input_handler};
pub use execute::execute_handler;
pub use health::health_handler;
pub use packages::{install_package_handler, list_packages_handler};

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct FailureResponse {
    success: bool,
    error: String,
}

impl FailureResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        error: format!("Invalid JSON body: {err}"),
    });
    InternalError::from_response(err, response).into()
}

/// Registers every API endpoint
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(execute_handler)
        .service(compile_c_handler)
        .service(compile_c_with_input_handler)
        .service(check_c_compiler_handler)
        .service(install_package_handler)
        .service(list_packages_handler)
        .service(health_handler);
}
