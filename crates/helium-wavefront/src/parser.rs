use crate::error::ParseError;
use crate::lexer::{Lexer, Line, Word};
use crate::model::{Face, FaceVertex, Wavefront};

/// Parses a Wavefront source string.
pub fn parse_str(src: &str) -> Result<Wavefront, ParseError> {
    let mut out = Wavefront::default();
    // Face words are kept so index range errors can point at the source.
    let mut face_sites: Vec<[(usize, usize); 3]> = Vec::new();

    for line in Lexer::new(src).lines() {
        let mut cursor = Cursor::new(&line);
        let Some(command) = cursor.next() else { continue };

        match command.text {
            "v" => {
                let p = cursor.vec3()?;
                cursor.finish()?;
                out.positions.push(p);
            }
            "vn" => {
                let n = cursor.vec3()?;
                cursor.finish()?;
                out.normals.push(n);
            }
            "vt" => {
                let u = cursor.float()?;
                let v = cursor.float()?;
                // `w` is optional in texture coordinates.
                let w = match cursor.peek() {
                    Some(_) => cursor.float()?,
                    None => 0.0,
                };
                cursor.finish()?;
                out.uvws.push([u, v, w]);
            }
            "f" => {
                let a = cursor.face_vertex()?;
                let b = cursor.face_vertex()?;
                let c = cursor.face_vertex()?;
                if let Some(extra) = cursor.peek() {
                    return Err(at(extra, "only triangular faces are supported"));
                }
                out.faces.push(Face { vertices: [a.0, b.0, c.0] });
                face_sites.push([a.1, b.1, c.1]);
            }
            // Grouping, smoothing and material statements carry nothing we draw.
            _ => {}
        }
    }

    check_ranges(&out, &face_sites)?;
    Ok(out)
}

fn check_ranges(obj: &Wavefront, sites: &[[(usize, usize); 3]]) -> Result<(), ParseError> {
    let bound = |count: usize, index: u32| index as usize <= count;

    for (face, site) in obj.faces.iter().zip(sites) {
        for (v, &(line, col)) in face.vertices.iter().zip(site) {
            if !bound(obj.positions.len(), v.position) {
                return Err(ParseError::new(
                    format!(
                        "position index {} out of range ({} positions)",
                        v.position,
                        obj.positions.len()
                    ),
                    line,
                    col,
                ));
            }
            if let Some(t) = v.uvw.filter(|&t| !bound(obj.uvws.len(), t)) {
                return Err(ParseError::new(
                    format!("texture index {t} out of range ({} coordinates)", obj.uvws.len()),
                    line,
                    col,
                ));
            }
            if let Some(n) = v.normal.filter(|&n| !bound(obj.normals.len(), n)) {
                return Err(ParseError::new(
                    format!("normal index {n} out of range ({} normals)", obj.normals.len()),
                    line,
                    col,
                ));
            }
        }
    }
    Ok(())
}

fn at(word: &Word<'_>, msg: impl Into<String>) -> ParseError {
    ParseError::new(msg, word.line, word.col)
}

// ── Cursor ────────────────────────────────────────────────────────────────

struct Cursor<'l, 's> {
    line: &'l Line<'s>,
    pos: usize,
}

impl<'l, 's> Cursor<'l, 's> {
    fn new(line: &'l Line<'s>) -> Self {
        Self { line, pos: 0 }
    }

    fn peek(&self) -> Option<&'l Word<'s>> {
        self.line.words.get(self.pos)
    }

    fn next(&mut self) -> Option<&'l Word<'s>> {
        let w = self.line.words.get(self.pos)?;
        self.pos += 1;
        Some(w)
    }

    fn expect(&mut self, what: &str) -> Result<&'l Word<'s>, ParseError> {
        self.next().ok_or_else(|| {
            ParseError::new(format!("expected {what}"), self.line.number, self.line.end_col())
        })
    }

    fn float(&mut self) -> Result<f32, ParseError> {
        let w = self.expect("a number")?;
        w.text
            .parse::<f32>()
            .map_err(|_| at(w, format!("invalid number `{}`", w.text)))
    }

    fn vec3(&mut self) -> Result<[f32; 3], ParseError> {
        Ok([self.float()?, self.float()?, self.float()?])
    }

    fn face_vertex(&mut self) -> Result<(FaceVertex, (usize, usize)), ParseError> {
        let w = self.expect("a face vertex")?;
        let mut parts = w.text.split('/');

        let index = |s: &str, required: bool| -> Result<Option<u32>, ParseError> {
            if s.is_empty() && !required {
                return Ok(None);
            }
            match s.parse::<u32>() {
                Ok(0) => Err(at(w, "face indices are 1-based; 0 is invalid")),
                Ok(i) => Ok(Some(i)),
                Err(_) => Err(at(w, format!("invalid face index `{s}`"))),
            }
        };

        let position = index(parts.next().unwrap_or(""), true)?.unwrap_or_default();
        let uvw = match parts.next() {
            Some(s) => index(s, false)?,
            None => None,
        };
        let normal = match parts.next() {
            Some(s) => index(s, false)?,
            None => None,
        };
        if parts.next().is_some() {
            return Err(at(w, format!("malformed face vertex `{}`", w.text)));
        }

        Ok((FaceVertex { position, uvw, normal }, (w.line, w.col)))
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            Some(extra) => Err(at(extra, format!("unexpected trailing value `{}`", extra.text))),
            None => Ok(()),
        }
    }
}
