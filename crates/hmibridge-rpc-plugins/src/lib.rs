//! Feature plugins contributing concrete commands to the bridge engine.
//!
//! [`RemoteControlPlugin`] forwards interior vehicle data requests from
//! applications to the head unit. [`SdlCorePlugin`] answers permission
//! queries issued by the head unit with the help of a [`PolicyHandler`].

mod rc;
mod sdl;

pub use rc::{GET_INTERIOR_VEHICLE_DATA, RemoteControlPlugin, SET_INTERIOR_VEHICLE_DATA};
pub use sdl::{
    GET_LIST_OF_PERMISSIONS, PermissionItem, PolicyHandler, SdlCorePlugin, StaticPolicyHandler,
};

#[cfg(test)]
mod tests;
