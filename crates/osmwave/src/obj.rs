//! Streaming Wavefront OBJ writer with batch-relative face indices.
//!
//! Records written:
//!   `# text`        comment
//!   `mtllib path`   material library
//!   `mtl name`      material switch
//!   `v x y z`       vertex
//!   `vn x y z`      normal (only from `vertex_with_normal`)
//!   `f a b c ...`   face, 1-based absolute vertex indices
//!
//! A batch calls [`ObjWriter::checkpoint`] once, emits its vertices, and then
//! refers to them as `0, 1, 2, ...`. The writer adds the vertex count recorded
//! at the checkpoint (and the OBJ 1-base) when a face is written.

use std::io::Write;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct ObjWriter<W: Write> {
    out: W,
    vertex_count: usize,
    offset: usize,
    face: Option<Vec<usize>>,
}

impl<W: Write> ObjWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            vertex_count: 0,
            offset: 0,
            face: None,
        }
    }

    /// Vertices emitted so far.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Vertex count recorded by the latest checkpoint.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// One `#` line per line of `text`; empty text gives a bare `#`.
    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.no_open_face("comment")?;

        if text.is_empty() {
            writeln!(self.out, "#")?;
        }
        for line in text.lines() {
            if line.is_empty() {
                writeln!(self.out, "#")?;
            } else {
                writeln!(self.out, "# {line}")?;
            }
        }

        Ok(())
    }

    pub fn material_library(&mut self, path: &str) -> Result<()> {
        self.no_open_face("mtllib")?;
        writeln!(self.out, "mtllib {path}")?;
        Ok(())
    }

    pub fn material(&mut self, name: &str) -> Result<()> {
        self.no_open_face("mtl")?;
        writeln!(self.out, "mtl {name}")?;
        Ok(())
    }

    /// Start a new batch: relative indices from here on resolve against the
    /// current vertex count.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.no_open_face("checkpoint")?;
        self.offset = self.vertex_count;
        Ok(())
    }

    /// Write a vertex and return its 1-based index in the whole stream.
    pub fn vertex(&mut self, x: f64, y: f64, z: f64) -> Result<usize> {
        self.no_open_face("vertex")?;
        writeln!(self.out, "v {x} {y} {z}")?;
        self.vertex_count += 1;
        Ok(self.vertex_count)
    }

    /// Write a vertex followed by its normal.
    pub fn vertex_with_normal(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        nx: f64,
        ny: f64,
        nz: f64,
    ) -> Result<usize> {
        let index = self.vertex(x, y, z)?;
        writeln!(self.out, "vn {nx} {ny} {nz}")?;
        Ok(index)
    }

    pub fn begin_face(&mut self) -> Result<()> {
        if self.face.is_some() {
            return Err(Error::MeshIndex("begin_face inside an open face".into()));
        }

        self.face = Some(Vec::with_capacity(4));
        Ok(())
    }

    /// Add a batch-relative index to the open face.
    pub fn push_index(&mut self, index: usize) -> Result<()> {
        let absolute = self.offset + index;
        if absolute >= self.vertex_count {
            return Err(Error::MeshIndex(format!(
                "relative index {index} (absolute {}) beyond the {} vertices emitted",
                absolute + 1,
                self.vertex_count
            )));
        }

        match self.face.as_mut() {
            Some(face) => {
                face.push(absolute + 1);
                Ok(())
            }
            None => Err(Error::MeshIndex("index pushed outside a face".into())),
        }
    }

    pub fn end_face(&mut self) -> Result<()> {
        let face = self
            .face
            .take()
            .ok_or_else(|| Error::MeshIndex("end_face without begin_face".into()))?;

        if face.len() < 3 {
            return Err(Error::MeshIndex(format!(
                "face with {} indices, need at least 3",
                face.len()
            )));
        }

        self.out.write_all(b"f")?;
        for index in &face {
            write!(self.out, " {index}")?;
        }
        self.out.write_all(b"\n")?;

        Ok(())
    }

    /// Write a whole face of batch-relative indices.
    pub fn face(&mut self, indices: &[usize]) -> Result<()> {
        self.begin_face()?;
        for &index in indices {
            if let Err(e) = self.push_index(index) {
                self.face = None;
                return Err(e);
            }
        }
        self.end_face()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn no_open_face(&self, what: &str) -> Result<()> {
        if self.face.is_some() {
            return Err(Error::MeshIndex(format!("{what} while a face is open")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(writer: ObjWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner()).unwrap()
    }

    fn face_indices(obj: &str) -> Vec<Vec<usize>> {
        obj.lines()
            .filter_map(|l| l.strip_prefix("f "))
            .map(|l| l.split_whitespace().map(|i| i.parse().unwrap()).collect())
            .collect()
    }

    #[test]
    fn directives_and_comments() {
        let mut w = ObjWriter::new(Vec::new());
        w.comment("Created with OSMWAVE").unwrap();
        w.comment("").unwrap();
        w.material_library("city.mtl").unwrap();
        w.material("roof").unwrap();

        assert_eq!(text(w), "# Created with OSMWAVE\n#\nmtllib city.mtl\nmtl roof\n");
    }

    #[test]
    fn vertices_return_stream_indices() {
        let mut w = ObjWriter::new(Vec::new());
        assert_eq!(w.vertex(1.0, 2.0, 3.5).unwrap(), 1);
        assert_eq!(w.vertex_with_normal(0.0, 0.0, 0.0, 0.0, 1.0, 0.0).unwrap(), 2);
        assert_eq!(w.vertex_count(), 2);

        assert_eq!(text(w), "v 1 2 3.5\nv 0 0 0\nvn 0 1 0\n");
    }

    #[test]
    fn faces_are_translated_by_checkpoint() {
        let mut w = ObjWriter::new(Vec::new());

        w.checkpoint().unwrap();
        for i in 0..3 {
            w.vertex(i as f64, 0.0, 0.0).unwrap();
        }
        w.face(&[0, 1, 2]).unwrap();

        w.checkpoint().unwrap();
        assert_eq!(w.offset(), 3);
        for i in 0..4 {
            w.vertex(i as f64, 1.0, 0.0).unwrap();
        }
        w.begin_face().unwrap();
        for i in [0, 1, 2, 3] {
            w.push_index(i).unwrap();
        }
        w.end_face().unwrap();

        assert_eq!(face_indices(&text(w)), vec![vec![1, 2, 3], vec![4, 5, 6, 7]]);
    }

    #[test]
    fn batches_never_share_indices() {
        let mut w = ObjWriter::new(Vec::new());
        let (n1, n2) = (5usize, 7usize);

        w.checkpoint().unwrap();
        for _ in 0..n1 {
            w.vertex(0.0, 0.0, 0.0).unwrap();
        }
        for i in 0..n1 - 2 {
            w.face(&[i, i + 1, i + 2]).unwrap();
        }
        let first_faces = n1 - 2;

        w.checkpoint().unwrap();
        for _ in 0..n2 {
            w.vertex(0.0, 0.0, 0.0).unwrap();
        }
        for i in 0..n2 - 2 {
            w.face(&[i, i + 1, i + 2]).unwrap();
        }

        let faces = face_indices(&text(w));
        for f in &faces[..first_faces] {
            assert!(f.iter().all(|&i| (1..=n1).contains(&i)));
        }
        for f in &faces[first_faces..] {
            assert!(f.iter().all(|&i| (n1 + 1..=n1 + n2).contains(&i)));
        }
    }

    #[test]
    fn protocol_misuse_is_reported() {
        let mut w = ObjWriter::new(Vec::new());
        w.vertex(0.0, 0.0, 0.0).unwrap();
        w.vertex(1.0, 0.0, 0.0).unwrap();

        assert!(matches!(w.push_index(0), Err(Error::MeshIndex(_))));
        assert!(matches!(w.end_face(), Err(Error::MeshIndex(_))));

        // Too few indices.
        assert!(matches!(w.face(&[0, 1]), Err(Error::MeshIndex(_))));

        // Index past the emitted vertices.
        assert!(matches!(w.face(&[0, 1, 2]), Err(Error::MeshIndex(_))));

        w.begin_face().unwrap();
        assert!(matches!(w.begin_face(), Err(Error::MeshIndex(_))));
        assert!(matches!(w.vertex(0.0, 0.0, 0.0), Err(Error::MeshIndex(_))));
        assert!(matches!(w.checkpoint(), Err(Error::MeshIndex(_))));

        // Failed faces leave nothing behind.
        w.push_index(0).unwrap();
        w.push_index(1).unwrap();
        assert!(w.end_face().is_err());
        assert_eq!(face_indices(&text(w)), Vec::<Vec<usize>>::new());
    }

    #[test]
    fn sink_failures_surface_as_io_errors() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut w = ObjWriter::new(Closed);
        let err = w.vertex(0.0, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_fatal());
    }
}
