//! Type-erased request and response envelopes.
//!
//! The dispatch path only needs the message type of a payload, so both
//! envelopes box the payload as `dyn Any + Send` next to its `TypeKey`.
//! Typed access goes through `downcast` / `downcast_ref`.

use std::any::Any;
use std::fmt;

use crate::types::TypeKey;

macro_rules! envelope {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        pub struct $name {
            type_key: TypeKey,
            body: Box<dyn Any + Send>,
        }

        impl $name {
            /// Wraps `payload`, recording its type as the envelope's message type.
            pub fn new<M: Any + Send>(payload: M) -> Self {
                Self {
                    type_key: TypeKey::of::<M>(),
                    body: Box::new(payload),
                }
            }

            /// Type of the wrapped payload.
            #[must_use]
            pub fn message_type(&self) -> TypeKey {
                self.type_key
            }

            /// Returns true when the payload is an `M`.
            #[must_use]
            pub fn is<M: Any>(&self) -> bool {
                self.body.is::<M>()
            }

            #[must_use]
            pub fn downcast_ref<M: Any>(&self) -> Option<&M> {
                self.body.downcast_ref::<M>()
            }

            /// Takes the payload out as an `M`, handing the envelope back untouched
            /// when the payload has a different type.
            ///
            /// # Errors
            ///
            /// Returns `self` if the payload is not an `M`.
            pub fn downcast<M: Any>(self) -> Result<M, Self> {
                match self.body.downcast::<M>() {
                    Ok(payload) => Ok(*payload),
                    Err(body) => Err(Self {
                        type_key: self.type_key,
                        body,
                    }),
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("message_type", &self.type_key.name())
                    .finish_non_exhaustive()
            }
        }
    };
}

envelope!(
    /// An incoming request object handed to the service manager by a transport.
    Request
);

envelope!(
    /// The value a handler produced for a request.
    Response
);
