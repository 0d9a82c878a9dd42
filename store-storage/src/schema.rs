//! Diesel table definitions, mirroring `migrations/2024-01-01-000000_init`.
//! Hand-maintained rather than `diesel print-schema`-generated.

pub mod sql_types {
    #[derive(diesel::sql_types::SqlType)]
    #[diesel(postgres_type(name = "object_type_enum"))]
    pub struct ObjectTypeEnum;

    #[derive(diesel::sql_types::SqlType)]
    #[diesel(postgres_type(name = "basic_type_enum"))]
    pub struct BasicTypeEnum;
}

diesel::table! {
    tenant (id) {
        id -> Int8,
        tenant_code -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::ObjectTypeEnum;

    object (id) {
        id -> Int8,
        tenant_id -> Int8,
        object_id -> Uuid,
        object_type -> ObjectTypeEnum,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    object_version (id) {
        id -> Int8,
        object_row_id -> Int8,
        object_version -> Int4,
        object_timestamp -> Timestamptz,
        definition_type -> Varchar,
        definition_content -> Binary,
        is_latest_object -> Bool,
    }
}

diesel::table! {
    tag (id) {
        id -> Int8,
        object_version_row_id -> Int8,
        tag_version -> Int4,
        tag_timestamp -> Timestamptz,
        is_latest_tag -> Bool,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::BasicTypeEnum;

    tag_attr (id) {
        id -> Int8,
        tag_row_id -> Int8,
        attr_name -> Varchar,
        element_index -> Int4,
        element_type -> BasicTypeEnum,
        value_boolean -> Nullable<Bool>,
        value_integer -> Nullable<Int8>,
        value_float -> Nullable<Double>,
        value_string -> Nullable<Text>,
        value_decimal -> Nullable<Numeric>,
        value_date -> Nullable<Date>,
        value_datetime -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use super::sql_types::ObjectTypeEnum;

    config_entry (id) {
        id -> Int8,
        tenant_id -> Int8,
        config_class -> Varchar,
        config_key -> Varchar,
        config_version -> Int4,
        config_timestamp -> Timestamptz,
        is_latest_config -> Bool,
        config_deleted -> Bool,
        selector_object_id -> Nullable<Uuid>,
        selector_object_type -> Nullable<ObjectTypeEnum>,
        selector_object_version -> Nullable<Int4>,
        selector_tag_version -> Nullable<Int4>,
        resource_sub_type -> Nullable<Varchar>,
    }
}

diesel::joinable!(object -> tenant (tenant_id));
diesel::joinable!(object_version -> object (object_row_id));
diesel::joinable!(tag -> object_version (object_version_row_id));
diesel::joinable!(tag_attr -> tag (tag_row_id));
diesel::joinable!(config_entry -> tenant (tenant_id));

diesel::allow_tables_to_appear_in_same_query!(
    tenant,
    object,
    object_version,
    tag,
    tag_attr,
    config_entry,
);
