use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

table! {
    users (id) {
        id -> BigInt,
        phone_number -> Text,
        username -> Nullable<Text>,
        profile_picture -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

table! {
    otp_sessions (id) {
        id -> BigInt,
        phone_number -> Text,
        code -> Text,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

table! {
    conversations (id) {
        id -> BigInt,
        kind -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    conversation_participants (id) {
        id -> BigInt,
        conversation_id -> BigInt,
        user_id -> BigInt,
    }
}

table! {
    messages (id) {
        id -> BigInt,
        conversation_id -> BigInt,
        sender_id -> BigInt,
        content -> Nullable<Text>,
        kind -> Text,
        file_url -> Nullable<Text>,
        status -> Text,
        is_read -> Bool,
        created_at -> Timestamptz,
        delivered_at -> Nullable<Timestamptz>,
        read_at -> Nullable<Timestamptz>,
    }
}

table! {
    calls (id) {
        id -> BigInt,
        caller_id -> BigInt,
        receiver_id -> BigInt,
        status -> Text,
        started_at -> Timestamptz,
        ended_at -> Nullable<Timestamptz>,
    }
}

joinable!(conversation_participants -> conversations (conversation_id));
joinable!(conversation_participants -> users (user_id));
joinable!(messages -> conversations (conversation_id));
joinable!(messages -> users (sender_id));

allow_tables_to_appear_in_same_query!(
    users,
    otp_sessions,
    conversations,
    conversation_participants,
    messages,
    calls,
);
