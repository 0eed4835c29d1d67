//! Foundation types shared by the weft crates: qualified names, atomic values,
//! node handles and item sequences.

pub mod atomic;
pub mod node;
pub mod qname;
pub mod value;

pub use atomic::{AtomicValue, format_double, parse_xs_double};
pub use node::{NodeHandle, NodeKind};
pub use qname::{
    ERR_NAMESPACE, QName, QNameError, XML_NAMESPACE, XMLNS_NAMESPACE, XS_NAMESPACE,
    XSLT_NAMESPACE, is_ncname,
};
pub use value::{XdmItem, XdmValue};
