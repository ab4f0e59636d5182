// Source-of-record tables read by the search sync.

diesel::table! {
    users (id) {
        id -> BigInt,
        brand -> Text,
        email -> Text,
        first_name -> Nullable<Text>,
        last_name -> Nullable<Text>,
        role -> Text,
        gender -> Nullable<Text>,
        birth_date -> Nullable<Date>,
        locale -> Nullable<Text>,
        city -> Nullable<Text>,
        latitude -> Nullable<Double>,
        longitude -> Nullable<Double>,
        active -> Bool,
        disabled -> Bool,
        deleted -> Bool,
        completed -> Bool,
        inappropriate -> Bool,
        invisible -> Bool,
        last_active_at -> Nullable<Timestamp>,
        last_synced_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    user_availabilities (user_id) {
        user_id -> BigInt,
        monday -> Nullable<Text>,
        tuesday -> Nullable<Text>,
        wednesday -> Nullable<Text>,
        thursday -> Nullable<Text>,
        friday -> Nullable<Text>,
        saturday -> Nullable<Text>,
        sunday -> Nullable<Text>,
    }
}

diesel::table! {
    user_preferences (user_id) {
        user_id -> BigInt,
        occasional_care -> Bool,
        regular_care -> Bool,
        max_children -> Nullable<Text>,
        hourly_rate -> Nullable<Double>,
        monday -> Nullable<Text>,
        tuesday -> Nullable<Text>,
        wednesday -> Nullable<Text>,
        thursday -> Nullable<Text>,
        friday -> Nullable<Text>,
        saturday -> Nullable<Text>,
        sunday -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    children (id) {
        id -> BigInt,
        user_id -> BigInt,
        birth_date -> Nullable<Date>,
    }
}

diesel::table! {
    recommendations (id) {
        id -> BigInt,
        user_id -> BigInt,
        author_name -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    avatars (id) {
        id -> BigInt,
        user_id -> BigInt,
        url -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    avatar_warnings (id) {
        id -> BigInt,
        user_id -> BigInt,
        reason -> Nullable<Text>,
        resolved -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    orders (id) {
        id -> BigInt,
        user_id -> BigInt,
        status -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    messages (id) {
        id -> BigInt,
        sender_id -> BigInt,
        receiver_id -> BigInt,
        created_at -> Timestamp,
    }
}

diesel::table! {
    invites (id) {
        id -> BigInt,
        sender_id -> BigInt,
        receiver_id -> BigInt,
        created_at -> Timestamp,
    }
}

diesel::table! {
    user_dirty_flags (user_id, flag) {
        user_id -> BigInt,
        flag -> Text,
        created_at -> Timestamp,
    }
}

diesel::joinable!(user_availabilities -> users (user_id));
diesel::joinable!(user_preferences -> users (user_id));
diesel::joinable!(children -> users (user_id));
diesel::joinable!(recommendations -> users (user_id));
diesel::joinable!(avatars -> users (user_id));
diesel::joinable!(avatar_warnings -> users (user_id));
diesel::joinable!(orders -> users (user_id));
diesel::joinable!(user_dirty_flags -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    user_availabilities,
    user_preferences,
    children,
    recommendations,
    avatars,
    avatar_warnings,
    orders,
    messages,
    invites,
    user_dirty_flags,
);
