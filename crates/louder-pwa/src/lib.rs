//! # Still Louder Lifecycle Manager
//!
//! Page-side half of the offline layer. Registers the cache controller,
//! polls for new versions, offers the "new version" notice and the custom
//! install prompt, and relays the user's answers back to the worker.
//!
//! ```text
//! PwaRuntime
//!     ├── LifecycleManager   PageEvent → Vec<PageEffect>
//!     │       ├── UpdateFlow
//!     │       ├── InstallFlow
//!     │       └── KeyValueStore  (installPromptDismissed)
//!     └── ServiceWorkerContainer
//! ```

pub mod error;
pub mod install;
pub mod manager;
pub mod prompt;
pub mod runtime;
pub mod storage;
pub mod update;

pub use error::{PwaError, PwaResult};
pub use install::{DeferredInstallPrompt, InstallFlow, InstallOutcome};
pub use manager::{LifecycleManager, PageEffect, PageEvent, Timer};
pub use prompt::PromptState;
pub use runtime::PwaRuntime;
pub use storage::{FileStore, KeyValueStore, MemoryStore, INSTALL_PROMPT_DISMISSED};
pub use update::UpdateFlow;
