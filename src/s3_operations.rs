use crate::config::ObjectStoreSettings;
use crate::error::{MapError, Result, SyncError};
use crate::s3::{self, ObjectStore, ObjectSummary};
use anyhow::{anyhow, Context};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_smithy_runtime_api::client::orchestrator::HttpRequest;
use aws_smithy_runtime_api::client::result::SdkError;
use regex::Regex;
use tracing::debug;

#[derive(Debug, PartialEq)]
pub struct S3Object {
    pub region: String,
    pub bucket: String,
    pub key: String,
}

impl S3Object {
    /// Parses a virtual-hosted AWS url (`https://{bucket}.s3.{region}.amazonaws.com/{key}`).
    pub fn from_url(url: &str) -> anyhow::Result<Self> {
        let re = Regex::new(
            r"https:\/\/(?<bucket>[\d\w-]+)\.s3\.(?<region>[\d\w-]+)\.amazonaws.com\/(?<key>.+)",
        )
        .expect("Regex pattern should always compile");

        let captures = re
            .captures(url)
            .ok_or(anyhow!("No regex matches found for: {}", url))?;

        let (_, [bucket, region, key]) = captures.extract();

        Ok(Self {
            region: region.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn to_url(&self) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, self.key
        )
    }
}

pub struct S3Provider {
    client: Client,
    strip_x_id_param: bool,
}

impl S3Provider {
    pub fn new(client: Client, strip_x_id_param: bool) -> Self {
        Self {
            client,
            strip_x_id_param,
        }
    }

    pub async fn from_settings(settings: &ObjectStoreSettings) -> Self {
        let client = s3::client_from_settings(settings).await;
        Self::new(client, settings.strip_x_id_param)
    }
}

impl ObjectStore for S3Provider {
    async fn list_common_prefixes(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut prefixes = vec![];
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .delimiter("/")
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.with_context(|| format!("Error listing prefixes under {prefix}"))?;
            prefixes.extend(
                page.common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(str::to_owned)),
            );
        }
        Ok(prefixes)
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>> {
        let mut objects = vec![];
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.with_context(|| format!("Error listing objects under {prefix}"))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    objects.push(ObjectSummary {
                        key: key.to_owned(),
                        size: object.size().unwrap_or(0).max(0) as u64,
                    });
                }
            }
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>> {
        let head = self.client.head_object().bucket(bucket).key(key).send().await;
        match head {
            Ok(head) => Ok(Some(head.content_length().unwrap_or(0).max(0) as u64)),
            Err(SdkError::ServiceError(e)) if e.err().is_not_found() => Ok(None),
            Err(e) => Err(anyhow::Error::from(e)
                .context(format!("Error reading head of s3://{bucket}/{key}"))
                .into()),
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let strip = self.strip_x_id_param;
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .customize()
            .map_request(move |req| strip_x_id_get_object_param(req, strip))
            .send()
            .await;

        let object = match object {
            Ok(object) => object,
            Err(SdkError::ServiceError(e)) if e.err().is_no_such_key() => {
                return Err(SyncError::NotFound {
                    key: key.to_owned(),
                })
            }
            Err(e) => {
                return Err(anyhow::Error::from(e)
                    .context(format!("Error fetching s3://{bucket}/{key}"))
                    .into())
            }
        };

        let data = object
            .body
            .collect()
            .await
            .with_context(|| format!("Error reading body of s3://{bucket}/{key}"))?
            .to_vec();
        Ok(data)
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<Vec<u8>> {
        let range = format!("bytes={}-{}", start_byte, end_byte);
        let strip = self.strip_x_id_param;
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range)
            .customize()
            .map_request(move |req| strip_x_id_get_object_param(req, strip))
            .send()
            .await;

        let object = match object {
            Ok(object) => object,
            Err(SdkError::ServiceError(e)) if e.err().is_no_such_key() => {
                return Err(SyncError::NotFound {
                    key: key.to_owned(),
                })
            }
            Err(e) => {
                return Err(anyhow::Error::from(e)
                    .context(format!("Error fetching range of s3://{bucket}/{key}"))
                    .into())
            }
        };

        let data = object
            .body
            .collect()
            .await
            .with_context(|| format!("Error reading body of s3://{bucket}/{key}"))?
            .to_vec();
        Ok(data)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        debug!(bucket, key, bytes = body.len(), "Putting object");
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("Error putting s3://{bucket}/{key}"))?;
        Ok(())
    }
}

/// Some S3-compatible servers throw a fit if the param 'x-id=GetObject' is present in the request.
/// This function can be passed to the `GetObjectFluentBuilder::map_request()` method to strip the
/// offending param from the generated uri.
fn strip_x_id_get_object_param(
    req: HttpRequest,
    strip: bool,
) -> std::result::Result<HttpRequest, MapError> {
    if !strip {
        return Ok(req);
    }
    let mut r = req.try_clone().ok_or(MapError::Clone)?;
    let _ = r.set_uri(r.uri().replace("x-id=GetObject", ""));
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_object_from_url() {
        let url = "https://e84-earth-search-sentinel-data.s3.us-west-2.amazonaws.com/sentinel-2-c1-l2a/7/V/DG/2024/5/S2A_T07VDG_20240529T205023_L2A/B08.tif";
        let object = S3Object::from_url(url).unwrap();
        assert_eq!(
            object,
            S3Object {
                bucket: "e84-earth-search-sentinel-data".to_string(),
                region: "us-west-2".to_string(),
                key: "sentinel-2-c1-l2a/7/V/DG/2024/5/S2A_T07VDG_20240529T205023_L2A/B08.tif"
                    .to_string()
            }
        );
        assert_eq!(object.to_url(), url);
    }

    #[test]
    fn test_s3_object_from_path_style_url() {
        let url = "https://s3-uk-1.sa-catapult.co.uk/public-eo-data/common_sensing/fiji/";
        assert!(S3Object::from_url(url).is_err());
    }
}
