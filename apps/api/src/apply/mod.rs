// Application form automation.
// Locate known fields by selector, fill them, stop before submitting.
// The browser is reached only through the `FormPage` and `SessionProvider` traits.

pub mod chrome;
pub mod fields;
pub mod filler;
pub mod handlers;
pub mod locator;
pub mod page;
pub mod session;

#[cfg(test)]
pub mod testing;
