pub mod autowiring;
pub mod builder;
pub mod collection;
pub mod context;
pub mod diagnostics;
pub mod hierarchy;
pub mod instance;
pub mod key;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod strategy;


pub use autowiring::{ConstructorTable, Inject, Injectable, PopulateFields};
pub use builder::ApplicationContextBuilder;
pub use collection::ComponentCollection;
pub use context::ApplicationContext;
pub use diagnostics::ContextDiagnostics;
pub use hierarchy::{BindingHierarchy, BindingInfo, CollectionHierarchy, RegistrationOutcome};
pub use instance::ComponentInstance;
pub use key::ComponentKey;
pub use pipeline::{
    ComponentPostProcessor, ComponentPreProcessor, FieldPopulationProcessor, PreProcessDecision,
    ProcessingPipeline, ProcessorInfo,
};
pub use registry::{ScopeRegistry, ScopeState};
pub use resolver::{ResolutionContext, ResolutionPath};
pub use scope::{ComponentScope, ContextStorage};
pub use strategy::{
    CollectionStrategy, ConstructorStrategy, InstanceStrategy, InstantiationStrategy,
    SingletonStrategy, SupplierStrategy,
};
