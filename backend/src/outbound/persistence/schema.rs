//! Diesel table definitions for the PostgreSQL schema.
//!
//! Maintained by hand alongside the embedded migrations so the persistence
//! adapters stay compile-safe while the schema evolves.

diesel::table! {
    providers (id) {
        id -> Uuid,
        name -> Varchar,
        display_name -> Varchar,
        category -> Varchar,
        base_url -> Text,
        rate_limit_rps -> Float8,
        burst_size -> Int4,
        daily_quota -> Nullable<Int4>,
        max_concurrent -> Int4,
        is_active -> Bool,
        configuration -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    provider_features (id) {
        id -> Uuid,
        provider_id -> Uuid,
        feature_id -> Varchar,
        feature_name -> Varchar,
        category -> Varchar,
        endpoint -> Text,
        http_method -> Varchar,
        credits_per_request -> Int4,
        parameters -> Jsonb,
        is_active -> Bool,
    }
}

diesel::table! {
    api_keys (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        provider_id -> Varchar,
        label -> Varchar,
        key_material -> Text,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    enrichment_jobs (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        provider_id -> Varchar,
        job_type -> Varchar,
        status -> Varchar,
        total_records -> Int4,
        processed_records -> Int4,
        successful_records -> Int4,
        failed_records -> Int4,
        input_data -> Jsonb,
        output_data -> Nullable<Jsonb>,
        configuration -> Nullable<Jsonb>,
        error_details -> Nullable<Text>,
        created_at -> Timestamptz,
        started_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    job_logs (id) {
        id -> Uuid,
        job_id -> Uuid,
        level -> Varchar,
        message -> Text,
        ts -> Timestamptz,
    }
}

diesel::table! {
    job_queue (id) {
        id -> Uuid,
        job_id -> Uuid,
        priority -> Int4,
        state -> Varchar,
        attempts -> Int4,
        fail_reason -> Nullable<Text>,
        enqueued_at -> Timestamptz,
        started_at -> Nullable<Timestamptz>,
        finished_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    api_usage (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        provider_id -> Varchar,
        endpoint -> Varchar,
        status_code -> Nullable<Varchar>,
        response_time_ms -> Int8,
        credits_used -> Int4,
        ts -> Timestamptz,
    }
}

diesel::joinable!(provider_features -> providers (provider_id));
diesel::joinable!(job_logs -> enrichment_jobs (job_id));

diesel::allow_tables_to_appear_in_same_query!(
    providers,
    provider_features,
    api_keys,
    enrichment_jobs,
    job_logs,
    job_queue,
    api_usage,
);
