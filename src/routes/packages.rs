use actix_web::{HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};

use super::{ErrorResponse, FailureResponse};
use crate::sandbox::{EngineError, PackageInstaller, PackageListing};

#[derive(Deserialize, Debug)]
pub struct InstallRequest {
    pub package: Option<String>,
}

#[derive(Serialize)]
struct InstallResponse {
    success: bool,
    message: String,
    output: String,
}

#[derive(Serialize)]
struct DiagnosticResponse {
    success: bool,
    error: String,
    output: String,
}

#[derive(Serialize)]
struct ListResponse {
    success: bool,
    #[serde(flatten)]
    listing: PackageListing,
}

#[post("/api/install-package")]
pub async fn install_package_handler(
    installer: web::Data<PackageInstaller>,
    body: web::Json<InstallRequest>,
) -> impl Responder {
    let Some(package) = body.into_inner().package else {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "No package name provided".to_string(),
        });
    };
    if package.trim().is_empty() {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Package name cannot be empty".to_string(),
        });
    }

    match installer.install(&package).await {
        Ok(report) => HttpResponse::Ok().json(InstallResponse {
            success: true,
            message: format!("Successfully installed {}", report.package),
            output: report.output,
        }),
        Err(EngineError::InvalidInput(error)) => {
            HttpResponse::BadRequest().json(FailureResponse::new(error))
        }
        Err(e @ EngineError::InstallTimedOut { .. }) => {
            HttpResponse::RequestTimeout().json(FailureResponse::new(e.to_string()))
        }
        Err(EngineError::InstallFailed {
            package,
            diagnostic,
        }) => HttpResponse::BadRequest().json(DiagnosticResponse {
            success: false,
            error: format!("Failed to install {package}"),
            output: diagnostic,
        }),
        Err(e) => {
            log::error!("Package installation failed: {e}");
            HttpResponse::InternalServerError()
                .json(FailureResponse::new(format!("Server error: {e}")))
        }
    }
}

#[get("/api/list-packages")]
pub async fn list_packages_handler(installer: web::Data<PackageInstaller>) -> impl Responder {
    match installer.list().await {
        Ok(listing) => HttpResponse::Ok().json(ListResponse {
            success: true,
            listing,
        }),
        Err(EngineError::ListFailed { diagnostic }) => {
            HttpResponse::BadRequest().json(DiagnosticResponse {
                success: false,
                error: "Failed to list packages".to_string(),
                output: diagnostic,
            })
        }
        Err(e) => {
            log::error!("Listing packages failed: {e}");
            HttpResponse::InternalServerError()
                .json(FailureResponse::new(format!("Server error: {e}")))
        }
    }
}
