//! Single-item and batch object/version/tag RPC entry points (spec.md
//! §4.6), built over `store_storage::MetadataGateway`. This is the one
//! place request validation, tag-update application against inherited
//! state, audit enrichment, and the public/trusted split all compose —
//! gateway, notifier, and clock are injected at construction rather than
//! resolved from globals, so tests can swap any of the three.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use store_core::{
    apply_tag_update, AttributeMap, BatchUpdate, BatchUpdateResult, ConfigEntryWrite, ConfigTombstone, Definition,
    Header, ObjectType, Preallocate, ScalarValue, SearchExpression, SearchParameters, Tag, TagSelector, TagUpdate,
    UpdateOperation, Value, VersionCriteria,
};
use store_core::batch::{CreateObject, NewTag, NewVersion};
use store_core::models::{
    ATTR_CREATE_TIME, ATTR_CREATE_USER_ID, ATTR_CREATE_USER_NAME, ATTR_UPDATE_TIME, ATTR_UPDATE_USER_ID,
    ATTR_UPDATE_USER_NAME,
};
use store_storage::MetadataGateway;

use crate::audit;
use crate::context::{CallerIdentity, CallerTrust, Clock, SystemClock};
use crate::error::{ApiError, ServiceResult};
use crate::notifier::{fire_and_forget, NoopNotifier, Notifier};
use crate::validation;

#[derive(Debug, Clone)]
pub struct CreateObjectRequest {
    pub object_type: ObjectType,
    pub definition: Definition,
    pub tag_updates: Vec<TagUpdate>,
}

#[derive(Debug, Clone)]
pub struct UpdateObjectRequest {
    pub object_id: Uuid,
    pub object_type: ObjectType,
    pub definition: Definition,
    pub tag_updates: Vec<TagUpdate>,
}

#[derive(Debug, Clone)]
pub struct UpdateTagRequest {
    pub object_id: Uuid,
    pub object_type: ObjectType,
    pub object_version: i32,
    pub tag_updates: Vec<TagUpdate>,
}

#[derive(Debug, Clone)]
pub struct CreatePreallocatedRequest {
    pub object_id: Uuid,
    pub object_type: ObjectType,
    pub definition: Definition,
    pub tag_updates: Vec<TagUpdate>,
}

/// A batch entry mirroring `store_core::batch::CreateObject` minus the
/// timestamps, which `write_batch` fills in from the injected clock.
#[derive(Debug, Clone)]
pub struct BatchCreateObject {
    pub object_id: Option<Uuid>,
    pub object_type: ObjectType,
    pub definition: Definition,
    pub tag_updates: Vec<TagUpdate>,
}

#[derive(Debug, Clone)]
pub struct BatchNewVersion {
    pub object_id: Uuid,
    pub object_type: ObjectType,
    pub definition: Definition,
    pub tag_updates: Vec<TagUpdate>,
}

#[derive(Debug, Clone)]
pub struct BatchNewTag {
    pub object_id: Uuid,
    pub object_type: ObjectType,
    pub object_version: i32,
    pub tag_updates: Vec<TagUpdate>,
}

/// One `writeBatch` request (spec.md §4.4 `saveBatchUpdate`, §4.6
/// `writeBatch`): all contained writes commit or none do.
#[derive(Debug, Clone, Default)]
pub struct WriteBatchRequest {
    pub preallocate: Vec<Preallocate>,
    pub create_objects: Vec<BatchCreateObject>,
    pub new_versions: Vec<BatchNewVersion>,
    pub new_tags: Vec<BatchNewTag>,
    pub config_entries: Vec<ConfigEntryWrite>,
    pub tombstones: Vec<ConfigTombstone>,
}

pub struct ObjectService {
    gateway: Arc<MetadataGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl ObjectService {
    pub fn new(gateway: Arc<MetadataGateway>) -> Self {
        ObjectService { gateway, notifier: Arc::new(NoopNotifier), clock: Arc::new(SystemClock) }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `readObject`/`loadTag` (spec.md §4.6).
    pub async fn read_object(&self, tenant_code: &str, selector: &TagSelector) -> ServiceResult<Tag> {
        Ok(self.gateway.load_tag(tenant_code, selector).await?)
    }

    /// `readBatch`/`loadTags` (spec.md §4.6): preserves input order, fails
    /// the whole batch on the first element error.
    pub async fn read_batch(&self, tenant_code: &str, selectors: &[TagSelector]) -> ServiceResult<Vec<Tag>> {
        Ok(self.gateway.load_tags(tenant_code, selectors).await?)
    }

    /// `createObject` (spec.md §4.6): materializes a tag from
    /// `(object_type, definition, tagUpdates[])`, applies those updates
    /// starting from an empty tag, injects audit attrs, and saves.
    pub async fn create_object(
        &self,
        tenant_code: &str,
        trust: CallerTrust,
        identity: &CallerIdentity,
        req: CreateObjectRequest,
    ) -> ServiceResult<Header> {
        validation::check_object_type_writable(req.object_type, trust)?;
        validate_tag_updates(&req.tag_updates, trust)?;

        let mut attrs = apply_tag_update(&AttributeMap::new(), &req.tag_updates)?;
        let now = self.clock.now();
        audit::stamp_creation(&mut attrs, now, identity);

        Ok(self.gateway.save_new_object(tenant_code, None, req.object_type, req.definition, now, now, attrs).await?)
    }

    /// `updateObject` (spec.md §4.6): resolves the object's current latest
    /// version, verifies type, applies tag updates over the inherited
    /// attributes, and saves the new version.
    pub async fn update_object(
        &self,
        tenant_code: &str,
        trust: CallerTrust,
        identity: &CallerIdentity,
        req: UpdateObjectRequest,
    ) -> ServiceResult<Header> {
        validation::check_object_type_writable(req.object_type, trust)?;
        validate_tag_updates(&req.tag_updates, trust)?;

        let prior_selector = TagSelector::latest(req.object_type, req.object_id);
        let prior = self.gateway.load_tag(tenant_code, &prior_selector).await?;

        let mut attrs = apply_tag_update(&prior.attrs, &req.tag_updates)?;
        let now = self.clock.now();
        audit::stamp_update(&mut attrs, now, identity);

        Ok(self
            .gateway
            .save_new_version(tenant_code, req.object_id, req.object_type, req.definition, now, now, attrs)
            .await?)
    }

    /// `updateTag` (spec.md §4.6): resolves the version's current latest
    /// tag, applies tag updates over its inherited attributes, and saves
    /// the new tag. `object_version` need not be the object's latest
    /// version (spec.md §8 scenario 2 tags an earlier version directly).
    pub async fn update_tag(
        &self,
        tenant_code: &str,
        trust: CallerTrust,
        identity: &CallerIdentity,
        req: UpdateTagRequest,
    ) -> ServiceResult<Header> {
        validate_tag_updates(&req.tag_updates, trust)?;

        let prior_selector = TagSelector {
            object_type: req.object_type,
            object_id: req.object_id,
            object_criteria: VersionCriteria::Explicit(req.object_version),
            tag_criteria: VersionCriteria::Latest,
        };
        let prior = self.gateway.load_tag(tenant_code, &prior_selector).await?;

        let mut attrs = apply_tag_update(&prior.attrs, &req.tag_updates)?;
        let now = self.clock.now();
        audit::stamp_update(&mut attrs, now, identity);

        Ok(self.gateway.save_new_tag(tenant_code, req.object_id, req.object_type, req.object_version, now, attrs).await?)
    }

    /// `preallocateId` (spec.md §4.6): a trusted-only write that reserves
    /// an ID without making it visible to readers.
    pub async fn preallocate_id(&self, tenant_code: &str, trust: CallerTrust, object_type: ObjectType) -> ServiceResult<Uuid> {
        require_trusted(trust)?;
        let object_id = Uuid::new_v4();
        self.gateway.preallocate_object_id(tenant_code, object_id, object_type).await?;
        Ok(object_id)
    }

    /// `createPreallocatedObject` (spec.md §4.6): a trusted-only write
    /// attaching version 1 to a previously reserved ID. Reserved attrs are
    /// permitted since the caller is trusted by construction.
    pub async fn create_preallocated_object(
        &self,
        tenant_code: &str,
        trust: CallerTrust,
        identity: &CallerIdentity,
        req: CreatePreallocatedRequest,
    ) -> ServiceResult<Header> {
        require_trusted(trust)?;
        validate_tag_updates(&req.tag_updates, trust)?;

        let mut attrs = apply_tag_update(&AttributeMap::new(), &req.tag_updates)?;
        let now = self.clock.now();
        audit::stamp_creation(&mut attrs, now, identity);

        Ok(self
            .gateway
            .save_new_object(tenant_code, Some(req.object_id), req.object_type, req.definition, now, now, attrs)
            .await?)
    }

    /// `writeBatch` (spec.md §4.4 `saveBatchUpdate`, §4.6): all contained
    /// writes commit in one DAL transaction or none do. Tag-update
    /// application against inherited state happens inside the DAL itself
    /// (so it shares the write's transactional snapshot); this layer's job
    /// is validation, trust enforcement, and appending the audit
    /// tag-updates each item carries into its own list.
    pub async fn write_batch(
        &self,
        tenant_code: &str,
        trust: CallerTrust,
        identity: &CallerIdentity,
        req: WriteBatchRequest,
    ) -> ServiceResult<BatchUpdateResult> {
        if !req.preallocate.is_empty() {
            require_trusted(trust)?;
        }
        let now = self.clock.now();
        let mut batch = BatchUpdate { preallocate: req.preallocate, ..Default::default() };

        for item in req.create_objects {
            validation::check_object_type_writable(item.object_type, trust)?;
            validate_tag_updates(&item.tag_updates, trust)?;
            let mut tag_updates = item.tag_updates;
            append_creation_audit_updates(&mut tag_updates, now, identity);
            batch.create_objects.push(CreateObject {
                object_id: item.object_id,
                object_type: item.object_type,
                definition: item.definition,
                tag_updates,
                object_timestamp: now,
                tag_timestamp: now,
            });
        }

        for item in req.new_versions {
            validation::check_object_type_writable(item.object_type, trust)?;
            validate_tag_updates(&item.tag_updates, trust)?;
            let mut tag_updates = item.tag_updates;
            append_update_audit_updates(&mut tag_updates, now, identity);
            batch.new_versions.push(NewVersion {
                object_id: item.object_id,
                object_type: item.object_type,
                definition: item.definition,
                tag_updates,
                object_timestamp: now,
                tag_timestamp: now,
            });
        }

        for item in req.new_tags {
            validation::check_object_type_writable(item.object_type, trust)?;
            validate_tag_updates(&item.tag_updates, trust)?;
            let mut tag_updates = item.tag_updates;
            append_update_audit_updates(&mut tag_updates, now, identity);
            batch.new_tags.push(NewTag {
                object_id: item.object_id,
                object_type: item.object_type,
                object_version: item.object_version,
                tag_updates,
                tag_timestamp: now,
            });
        }

        batch.config_entries = req.config_entries;
        batch.tombstones = req.tombstones;

        let result = self.gateway.save_batch_update(tenant_code, &batch).await?;
        fire_and_forget(self.notifier.clone(), tenant_code.to_string(), result.clone());
        Ok(result)
    }

    /// `search` (spec.md §4.5, §4.6).
    pub async fn search(&self, tenant_code: &str, params: &SearchParameters) -> ServiceResult<Vec<Tag>> {
        validate_search_expression(&params.expression)?;
        Ok(self.gateway.search(tenant_code, params).await?)
    }
}

fn require_trusted(trust: CallerTrust) -> Result<(), ApiError> {
    if trust != CallerTrust::Trusted {
        return Err(ApiError::permission_denied("this operation requires a trusted caller"));
    }
    Ok(())
}

fn validate_tag_updates(updates: &[TagUpdate], trust: CallerTrust) -> Result<(), ApiError> {
    for update in updates {
        if matches!(update.operation, UpdateOperation::ClearAllAttr) {
            continue;
        }
        validation::check_attr_write_permitted(&update.attr_name, trust)?;
    }
    Ok(())
}

fn validate_search_expression(expr: &SearchExpression) -> Result<(), ApiError> {
    match expr {
        SearchExpression::Term(term) => validation::validate_attr_name(&term.attr_name),
        SearchExpression::Logical(_, children) => {
            for child in children {
                validate_search_expression(child)?;
            }
            Ok(())
        }
    }
}

fn replace_update(name: &str, value: Value) -> TagUpdate {
    TagUpdate { operation: UpdateOperation::CreateOrReplaceAttr, attr_name: name.to_string(), value: Some(value) }
}

fn append_update_audit_updates(tag_updates: &mut Vec<TagUpdate>, now: DateTime<Utc>, identity: &CallerIdentity) {
    tag_updates.push(replace_update(ATTR_UPDATE_TIME, Value::scalar(ScalarValue::Datetime(now))));
    tag_updates.push(replace_update(ATTR_UPDATE_USER_ID, Value::scalar(ScalarValue::String(identity.user_id.clone()))));
    tag_updates.push(replace_update(ATTR_UPDATE_USER_NAME, Value::scalar(ScalarValue::String(identity.user_name.clone()))));
}

fn append_creation_audit_updates(tag_updates: &mut Vec<TagUpdate>, now: DateTime<Utc>, identity: &CallerIdentity) {
    append_update_audit_updates(tag_updates, now, identity);
    tag_updates.push(replace_update(ATTR_CREATE_TIME, Value::scalar(ScalarValue::Datetime(now))));
    tag_updates.push(replace_update(ATTR_CREATE_USER_ID, Value::scalar(ScalarValue::String(identity.user_id.clone()))));
    tag_updates.push(replace_update(ATTR_CREATE_USER_NAME, Value::scalar(ScalarValue::String(identity.user_name.clone()))));
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_core::{BasicType, Operator, TermValue};

    #[test]
    fn clear_all_attr_update_skips_name_validation() {
        let updates = vec![TagUpdate { operation: UpdateOperation::ClearAllAttr, attr_name: String::new(), value: None }];
        assert!(validate_tag_updates(&updates, CallerTrust::Public).is_ok());
    }

    #[test]
    fn reserved_attr_update_rejected_for_public_caller() {
        let updates = vec![TagUpdate::create("trac_create_time", Value::scalar(ScalarValue::String("x".into())))];
        let err = validate_tag_updates(&updates, CallerTrust::Public).unwrap_err();
        assert_eq!(err.code, crate::error::ApiErrorCode::InvalidArgument);
    }

    #[test]
    fn search_expression_validates_every_nested_term() {
        let bad_term = SearchExpression::term("9bad", BasicType::String, Operator::Eq, TermValue::Scalar(ScalarValue::String("x".into())));
        let wrapped = SearchExpression::and(vec![bad_term]);
        assert!(validate_search_expression(&wrapped).is_err());
    }

    #[test]
    fn creation_audit_updates_include_both_create_and_update_attrs() {
        let mut updates = Vec::new();
        append_creation_audit_updates(&mut updates, Utc::now(), &CallerIdentity::new("u1", "Alice"));
        assert_eq!(updates.len(), 6);
    }
}
