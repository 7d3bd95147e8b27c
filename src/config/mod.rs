pub mod settings;

pub use settings::{
    generate_default_config, ClusterSettings, DatacenterSettings, DatastoreSettings,
    LoggingSettings, PlacementSettings, Settings,
};
