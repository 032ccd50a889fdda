/// Principal root defaults shared across crates
pub const PRINCIPAL_ROOT: &str = "/principals/";
pub const USER_PRINCIPAL_ROOT: &str = const_str::concat!(PRINCIPAL_ROOT, "users/");
pub const GROUP_PRINCIPAL_ROOT: &str = const_str::concat!(PRINCIPAL_ROOT, "groups/");
pub const ADMIN_GROUP_PRINCIPAL_ROOT: &str = const_str::concat!(GROUP_PRINCIPAL_ROOT, "bwadmin/");

/// Root element of every dump document
pub const DUMP_ROOT: &str = "caldata";

/// Public user account assumed when configuration does not name one
pub const DEFAULT_PUBLIC_USER: &str = "public-user";

/// Prefix of admin group accounts whose subscriptions are world readable
pub const DEFAULT_ADMIN_GROUPS_ID_PREFIX: &str = "agrp_";

/// Legacy user id 0 is restored as this id
pub const DEFAULT_LEGACY_USER0_ID: i64 = 1;

/// Idle interval after which the principal lookup cache is dropped
pub const DEFAULT_PRINCIPAL_CACHE_FLUSH_SECS: u64 = 150;

/// Access granted to aliases created for public and admin group owners
pub const DEFAULT_PUBLIC_ACCESS: &str = "<all/> read";

/// Legacy auth user type bit marking a superuser
pub const LEGACY_SUPERUSER_TYPE: i64 = 32768;
