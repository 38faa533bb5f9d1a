//! System-wide constants and defaults.

/// Application name used in CLI output and manifests.
pub const APP_NAME: &str = "stratus";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "stratus";

/// Default directory the cloud assembly is written to.
pub const DEFAULT_OUTPUT_DIR: &str = "stratus.out";

/// Default app manifest read by the CLI.
pub const DEFAULT_MANIFEST_FILE: &str = "stratus.yaml";

/// Suffix appended to a stack name to form its template file name.
pub const TEMPLATE_FILE_SUFFIX: &str = ".template.json";

/// Name of the assembly manifest file.
pub const ASSEMBLY_MANIFEST_FILE: &str = "manifest.json";

/// Version written into the assembly manifest.
pub const ASSEMBLY_MANIFEST_VERSION: &str = "1.0";

/// Artifact type recorded for stack templates.
pub const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";

/// Template format version emitted in every template.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Metadata key holding the construct path of a rendered resource.
pub const PATH_METADATA_KEY: &str = "stratus:path";

/// Opening delimiter of an encoded token string.
pub const TOKEN_MARKER_START: &str = "${Token[";

/// Closing delimiter of an encoded token string.
pub const TOKEN_MARKER_END: &str = "]}";

/// Maximum nesting of lazy values before resolution gives up.
pub const MAX_LAZY_DEPTH: usize = 32;

/// Maximum length of a logical id.
pub const MAX_LOGICAL_ID_LENGTH: usize = 255;

/// Maximum length of the human-readable part of a logical id.
pub const MAX_HUMAN_ID_LENGTH: usize = 240;

/// Number of hex characters of path hash appended to logical ids.
pub const LOGICAL_ID_HASH_LENGTH: usize = 8;

/// Path component dropped entirely from logical ids.
pub const HIDDEN_ID: &str = "Default";

/// Path component hidden from the human part of logical ids.
pub const HIDDEN_FROM_HUMAN_ID: &str = "Resource";

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Number of availability zones a default VPC spans.
pub const DEFAULT_MAX_AZS: usize = 2;

/// CIDR block of a default VPC.
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

/// Construct id prefix of the per-stack shared ECS cluster.
pub const DEFAULT_CLUSTER_ID: &str = "EcsDefaultClusterMnL3mNNYN";

/// Container name used by task image options.
pub const DEFAULT_CONTAINER_NAME: &str = "web";

/// Container port used by task image options.
pub const DEFAULT_CONTAINER_PORT: u16 = 80;

/// Fargate task CPU units when unspecified.
pub const DEFAULT_FARGATE_CPU: u32 = 256;

/// Fargate task memory (MiB) when unspecified.
pub const DEFAULT_FARGATE_MEMORY_MIB: u32 = 512;

/// Health check grace period applied once a load balancer is attached.
pub const DEFAULT_HEALTH_CHECK_GRACE_PERIOD_SECS: u32 = 60;

/// Smallest accepted load balancer idle timeout in seconds.
pub const MIN_IDLE_TIMEOUT_SECS: u32 = 1;

/// Largest accepted load balancer idle timeout in seconds.
pub const MAX_IDLE_TIMEOUT_SECS: u32 = 4000;

/// Maximum length of a load balancer name.
pub const MAX_LOAD_BALANCER_NAME_LENGTH: usize = 32;

/// Environment variable overriding the output directory.
pub const ENV_OUTPUT_DIR: &str = "STRATUS_OUTDIR";

/// Environment variable overriding the default region.
pub const ENV_REGION: &str = "STRATUS_REGION";

/// Environment variable overriding the default account.
pub const ENV_ACCOUNT: &str = "STRATUS_ACCOUNT";

/// Environment variable enabling strict mode.
pub const ENV_STRICT: &str = "STRATUS_STRICT";
