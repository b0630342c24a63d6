//! Project endpoints. These need a logged-in session (see
//! [`ModelMwClient::login`]).

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use mmw_core::endpoints::{self, PROJECTS, SUBBASINS};
use mmw_core::{AreaOfInterest, ModelPackage, Payload};

use crate::client::ModelMwClient;
use crate::error::ClientError;
use crate::executor::Outcome;

const DEFAULT_PROJECT_NAME: &str = "Untitled Project";

/// Replacement data layers for a project or GWLF-E prepare job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerOverrides {
    #[serde(rename = "__LAND__", default, skip_serializing_if = "Option::is_none")]
    pub land: Option<String>,
    #[serde(rename = "__STREAMS__", default, skip_serializing_if = "Option::is_none")]
    pub streams: Option<String>,
}

impl LayerOverrides {
    pub fn is_empty(&self) -> bool {
        self.land.is_none() && self.streams.is_none()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRequest {
    pub name: String,
    pub model_package: ModelPackage,
    /// GeoJSON shape; wins over `huc` and `wkaoi`.
    pub area_of_interest: Option<Value>,
    pub huc: Option<String>,
    pub wkaoi: Option<String>,
    pub mapshed_job_uuid: Option<String>,
    pub subbasin_mapshed_job_uuid: Option<String>,
    pub layer_overrides: Option<LayerOverrides>,
}

impl ProjectRequest {
    pub fn new(model_package: ModelPackage) -> Self {
        Self {
            name: DEFAULT_PROJECT_NAME.to_string(),
            model_package,
            area_of_interest: None,
            huc: None,
            wkaoi: None,
            mapshed_job_uuid: None,
            subbasin_mapshed_job_uuid: None,
            layer_overrides: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_aoi(mut self, aoi: &AreaOfInterest) -> Self {
        match aoi {
            AreaOfInterest::Huc(code) => self.huc = Some(code.clone()),
            AreaOfInterest::WellKnown(id) => self.wkaoi = Some(id.clone()),
            AreaOfInterest::Shape(shape) => self.area_of_interest = Some(shape.clone()),
        }
        self
    }

    pub fn payload(&self) -> Result<Value, ClientError> {
        let mut payload = Map::new();
        payload.insert("name".into(), Value::String(self.name.clone()));
        payload.insert(
            "model_package".into(),
            Value::String(self.model_package.as_str().to_string()),
        );

        if let Some(shape) = &self.area_of_interest {
            payload.insert("area_of_interest".into(), shape.clone());
        } else if let Some(huc) = non_blank(&self.huc) {
            payload.insert("huc".into(), Value::String(huc.to_string()));
        } else if let Some(wkaoi) = non_blank(&self.wkaoi) {
            payload.insert("wkaoi".into(), Value::String(wkaoi.to_string()));
        } else {
            return Err(ClientError::InvalidRequest(
                "a project needs a HUC code, a WKAoI or a GeoJSON area of interest".into(),
            ));
        }

        if let Some(uuid) = non_blank(&self.mapshed_job_uuid) {
            payload.insert("mapshed_job_uuid".into(), Value::String(uuid.to_string()));
        }
        if let Some(uuid) = non_blank(&self.subbasin_mapshed_job_uuid) {
            payload.insert(
                "subbasin_mapshed_job_uuid".into(),
                Value::String(uuid.to_string()),
            );
        }
        if let Some(overrides) = &self.layer_overrides {
            payload.insert("layer_overrides".into(), overrides.to_value());
        }
        Ok(Value::Object(payload))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl ModelMwClient {
    /// Create a project; returns the service's project description (with `id`),
    /// or None when the service refused.
    pub async fn create_project(
        &self,
        request: &ProjectRequest,
    ) -> Result<Option<Value>, ClientError> {
        let payload = Payload::Fields(request.payload()?);
        let prepared = self
            .normalizer
            .normalize(Method::POST, PROJECTS, Some(&payload))?;
        match self
            .executor
            .execute(&prepared, &["id"], &self.interrupt())
            .await
        {
            Outcome::Succeeded { json, .. } => {
                info!("Created project '{}'", request.name);
                Ok(json)
            }
            Outcome::Failed { failure, .. } => {
                error!("Failed to create project '{}': {}", request.name, failure);
                Ok(None)
            }
        }
    }

    /// Delete a project. A project that is already gone counts as deleted.
    pub async fn delete_project(&self, project_id: &str) -> Result<bool, ClientError> {
        let prepared =
            self.normalizer
                .normalize(Method::DELETE, &endpoints::project(project_id), None)?;
        let outcome = self
            .executor
            .execute(&prepared, &[], &self.interrupt())
            .await;
        if let Outcome::Failed { failure, .. } = &outcome {
            error!("Failed to delete project {}: {}", project_id, failure);
        }
        Ok(outcome.succeeded())
    }

    /// Weather for a project inside the Delaware River Basin, averaged from the
    /// nearest stations. `layer` is one of [`endpoints::WEATHER_LAYERS`].
    pub async fn get_project_weather(
        &self,
        project_id: &str,
        layer: &str,
    ) -> Result<Option<Value>, ClientError> {
        let prepared = self.normalizer.normalize(
            Method::GET,
            &endpoints::project_weather(project_id, layer),
            None,
        )?;
        match self
            .executor
            .execute(&prepared, &["output"], &self.interrupt())
            .await
        {
            Outcome::Succeeded { json, .. } => Ok(json),
            Outcome::Failed { failure, .. } => {
                error!("Failed to get weather data for project {}: {}", project_id, failure);
                Ok(None)
            }
        }
    }

    /// GeoJSON and metadata for the HUC-12 subbasins of a subbasin prepare job.
    pub async fn get_subbasin_details(
        &self,
        mapshed_job_uuid: &str,
    ) -> Result<Option<Vec<Value>>, ClientError> {
        let prepared = self
            .normalizer
            .normalize(Method::POST, SUBBASINS, None)?
            .with_query("mapshed_job_uuid", mapshed_job_uuid)?;
        let json = match self
            .executor
            .execute(&prepared, &[], &self.interrupt())
            .await
        {
            Outcome::Succeeded { json, .. } => json,
            Outcome::Failed { failure, .. } => {
                error!("Failed to get sub-basin details: {}", failure);
                return Ok(None);
            }
        };

        match json {
            Some(Value::Array(subbasins)) if has_shape(subbasins.first()) => {
                info!("Got information about {} HUC-12 subbasins", subbasins.len());
                Ok(Some(subbasins))
            }
            _ => {
                error!("Sub-basin details response had no subbasin shapes");
                Ok(None)
            }
        }
    }
}

fn has_shape(first: Option<&Value>) -> bool {
    first
        .and_then(|subbasin| subbasin.get("shape"))
        .is_some_and(|shape| !shape.is_null())
}
