// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Domain Models
//!
//! - [`ResourceNode`] - one declared unit of infrastructure and its run state
//! - [`NodeId`] - stable logical id
//! - [`ResourceKind`] - type tag selecting the driver that realizes a node
//! - [`Properties`] - opaque property bag, possibly holding [`Reference`]s
//! - [`StackDeclaration`] - flat JSON declaration of a deployment

pub mod declaration;
pub mod references;
pub mod resource_node;
pub mod resource_type;

pub use declaration::{satellite_image_stack, ResourceDeclaration, StackDeclaration};
pub use references::{
    collect_references, resolve_properties, Reference, ReferenceSource, ResolveError,
};
pub use resource_node::{NodeId, Properties, ResourceNode};
pub use resource_type::ResourceKind;
