//! Bucket, attribution and project operations.

use sha2::{Digest, Sha256};
use strata_core::{MetainfoError, PartnerId, ProjectId, Result};
use strata_store::{Bucket, BucketListOptions};
use uuid::Uuid;

use super::Endpoint;
use crate::collaborators::{Action, ActionKind, AttributionInfo, RequestHeader};
use crate::messages::{
    BucketListItem, CreateBucketRequest, DeleteBucketRequest, GetBucketRequest,
    ListBucketsRequest, ListBucketsResponse, ProjectInfo, SetBucketAttributionRequest,
};
use crate::validation::{validate_bucket, validate_redundancy};

fn bucket_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

impl Endpoint {
    /// Fetch a bucket. Its redundancy is always reported as the satellite scheme.
    pub async fn get_bucket(&self, req: GetBucketRequest) -> Result<Bucket> {
        let key = self
            .validate_auth(&req.header, ActionKind::Read, &req.name, &[])
            .await?;

        let mut bucket = self
            .buckets
            .get_bucket(key.project_id, &bucket_name(&req.name))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    e
                } else {
                    MetainfoError::internal(e.message())
                }
            })?;
        bucket.default_redundancy = self.satellite_redundancy();
        Ok(bucket)
    }

    /// Create a bucket in the caller's project.
    pub async fn create_bucket(&self, req: CreateBucketRequest) -> Result<Bucket> {
        let key = self
            .validate_auth(&req.header, ActionKind::Write, &req.name, &[])
            .await?;

        validate_bucket(&req.name)?;
        validate_redundancy(&req.default_redundancy, &self.config.rs, self.config.validate_rs)?;

        let name = bucket_name(&req.name);
        match self.buckets.get_bucket(key.project_id, &name).await {
            Ok(_) => return Err(MetainfoError::already_exists("bucket already exists")),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(MetainfoError::internal(e.message())),
        }

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name,
            project_id: key.project_id,
            partner_id: None,
            path_cipher: req.path_cipher,
            default_segment_size: req.default_segment_size,
            default_redundancy: req.default_redundancy,
            default_encryption: req.default_encryption,
            created_at: self.clock.now(),
        };
        let mut bucket = self.buckets.create_bucket(bucket).await.map_err(|e| {
            if e.status_code() == strata_core::StatusCode::AlreadyExists {
                e
            } else {
                tracing::error!(error = %e, "error while creating bucket");
                MetainfoError::internal("unable to create bucket")
            }
        })?;

        tracing::info!(project_id = %key.project_id, bucket = %bucket.name, "bucket created");
        bucket.default_redundancy = self.satellite_redundancy();
        Ok(bucket)
    }

    /// Remove a bucket. Objects inside it are not touched.
    pub async fn delete_bucket(&self, req: DeleteBucketRequest) -> Result<()> {
        let key = self
            .validate_auth(&req.header, ActionKind::Delete, &req.name, &[])
            .await?;

        validate_bucket(&req.name)?;

        self.buckets
            .delete_bucket(key.project_id, &bucket_name(&req.name))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    e
                } else {
                    MetainfoError::internal(e.message())
                }
            })
    }

    /// List the buckets the caller's key may see.
    pub async fn list_buckets(&self, req: ListBucketsRequest) -> Result<ListBucketsResponse> {
        let action = Action {
            op: ActionKind::Read,
            bucket: Vec::new(),
            encrypted_path: Vec::new(),
            time: self.clock.now(),
        };
        let key = self
            .collaborators
            .authorizer
            .validate_auth(&req.header, &action)
            .await
            .map_err(|e| MetainfoError::unauthenticated(e.message()))?;

        let allowed = self
            .collaborators
            .authorizer
            .allowed_buckets(&req.header, &action)
            .await
            .map_err(|e| MetainfoError::internal(format!("GetAllowedBuckets: {}", e.message())))?;

        let options = BucketListOptions {
            cursor: bucket_name(&req.cursor),
            direction: req.direction,
            limit: req.limit,
        };
        let list = self
            .buckets
            .list_buckets(key.project_id, options, &allowed)
            .await?;

        Ok(ListBucketsResponse {
            items: list
                .items
                .into_iter()
                .map(|bucket| BucketListItem {
                    name: bucket.name.into_bytes(),
                    created_at: bucket.created_at,
                })
                .collect(),
            more: list.more,
        })
    }

    /// Attribute a bucket to a partner.
    pub async fn set_bucket_attribution(&self, req: SetBucketAttributionRequest) -> Result<()> {
        self.set_attribution(&req.header, &req.name, &req.partner_id)
            .await
    }

    /// Legacy entry point for [`Self::set_bucket_attribution`].
    pub async fn set_attribution_old(
        &self,
        header: &RequestHeader,
        bucket: &[u8],
        partner_id: &[u8],
    ) -> Result<()> {
        self.set_attribution(header, bucket, partner_id).await
    }

    /// Salt clients derive project-scoped keys from.
    pub async fn project_info(&self, header: &RequestHeader) -> Result<ProjectInfo> {
        let key = self
            .validate_auth(header, ActionKind::ProjectInfo, &[], &[])
            .await?;

        let salt = Sha256::digest(key.project_id.as_bytes());
        Ok(ProjectInfo {
            project_salt: salt.to_vec(),
        })
    }

    /// Attribution only sticks to empty buckets and never changes once set.
    async fn set_attribution(
        &self,
        header: &RequestHeader,
        bucket: &[u8],
        partner_id: &[u8],
    ) -> Result<()> {
        let key = self
            .validate_auth(header, ActionKind::List, bucket, &[])
            .await?;

        let partner_id = self.resolve_partner_id(header, partner_id).await?;
        let project_id = key.project_id;

        match self.collaborators.attributions.get(project_id, bucket).await {
            Ok(Some(_)) => {
                tracing::info!(%project_id, bucket = %bucket_name(bucket), "bucket already attributed");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => return Err(MetainfoError::internal(e.message())),
        }

        if !self.bucket_is_empty(project_id, bucket).await? {
            return Err(MetainfoError::already_exists(format!(
                "bucket {:?} is not empty, PartnerID {:?} cannot be attributed",
                bucket_name(bucket),
                partner_id.to_string(),
            )));
        }

        let mut stored = self
            .buckets
            .get_bucket(project_id, &bucket_name(bucket))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    MetainfoError::not_found(format!("bucket {:?} does not exist", bucket_name(bucket)))
                } else {
                    tracing::error!(error = %e, "error while getting bucket");
                    MetainfoError::internal("unable to set bucket attribution")
                }
            })?;
        if stored.partner_id.is_some() {
            tracing::info!(%project_id, bucket = %stored.name, "bucket already attributed");
            return Ok(());
        }

        stored.partner_id = Some(partner_id);
        self.buckets.update_bucket(stored).await.map_err(|e| {
            tracing::error!(error = %e, "error while updating bucket");
            MetainfoError::internal("unable to set bucket attribution")
        })?;

        self.collaborators
            .attributions
            .insert(AttributionInfo {
                project_id,
                bucket_name: bucket.to_vec(),
                partner_id,
                created_at: self.clock.now(),
            })
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;

        tracing::info!(%project_id, bucket = %bucket_name(bucket), %partner_id, "bucket attributed");
        Ok(())
    }

    /// Explicit partner id wins over the user agent.
    async fn resolve_partner_id(&self, header: &RequestHeader, partner_id: &[u8]) -> Result<PartnerId> {
        if !partner_id.is_empty() {
            return PartnerId::from_slice(partner_id).map_err(|e| {
                MetainfoError::invalid_argument(format!("unable to parse partner ID: {}", e.message()))
            });
        }
        if header.user_agent.is_empty() {
            return Err(MetainfoError::invalid_argument(
                "unknown user agent or partner id",
            ));
        }
        let user_agent = String::from_utf8_lossy(&header.user_agent);
        self.collaborators
            .partners
            .by_user_agent(&user_agent)
            .await
            .map_err(|e| {
                MetainfoError::invalid_argument(format!("unable to resolve user agent: {}", e.message()))
            })
    }

    async fn bucket_is_empty(&self, project_id: ProjectId, bucket: &[u8]) -> Result<bool> {
        let prefix = Self::segment_path(project_id, strata_core::LAST_SEGMENT, bucket, &[])?;
        let (items, _) = self
            .pointers
            .list(&prefix, &[], true, 1)
            .await
            .map_err(|e| MetainfoError::internal(e.message()))?;
        Ok(items.is_empty())
    }
}
