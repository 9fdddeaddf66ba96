//! SOAP / ONVIF plumbing
//!
//! ## Responsibilities
//!
//! - Namespace-agnostic XML extraction over raw SOAP text
//! - SOAP 1.2 envelope and fault rendering
//! - WS-Security UsernameToken (PasswordDigest) generation and verification

mod envelope;
mod wsse;
mod xml;

pub use envelope::{envelope, fault, SOAP_CONTENT_TYPE, SOAP_NAMESPACES};
pub use wsse::UsernameToken;
pub use xml::{
    body_operation, escape, extract_all_elements, extract_attribute_where, extract_capability_xaddr, extract_element,
    extract_xml_attribute, extract_xml_value, elements, local_name, XmlElement,
};
