//! Compilador para microcontroladores AVR de 8 bits.
//!
//! # Front end
//! Cada programa deriva de un archivo raíz de código fuente y de los
//! archivos que este importe. Cada archivo se somete primero a análisis
//! léxico en [`scan`], de lo cual se obtiene un flujo de tokens. El
//! flujo de tokens se dispone en un árbol sintáctico ([`syntax`]) por
//! medio de análisis sintáctico en [`parse`]. Los nombres y operadores
//! del árbol se resuelven en [`bind`], lo cual produce el árbol
//! semántico descrito en [`semantic`].
//!
//! # Reducción
//! Antes de generar código, [`lower`] reemplaza las estructuras de
//! control por etiquetas y saltos, y corrige la igualdad de cadenas.
//! El resultado solo contiene construcciones que se corresponden de
//! forma directa con instrucciones de [`target`].
//!
//! # Errores
//! Toda fase reporta el primer error que encuentra, acompañado de su
//! ubicación ([`source`]). [`error::Diagnostics`] se encarga de
//! presentarlos.

pub mod bind;
pub mod error;
pub mod lower;
pub mod parse;
pub mod scan;
pub mod semantic;
pub mod source;
pub mod syntax;
pub mod target;
