use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LibraryError;
use crate::models::{Book, BookStatus, NewBook};

use super::is_unique_violation;

const COLUMNS: &str = "id, isbn, title, author, status";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        isbn: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        status: row.get(4)?,
    })
}

/// Add a book to the catalog. New books are always AVAILABLE.
pub fn insert_book(conn: &Connection, book: &NewBook) -> Result<Book> {
    conn.execute(
        "INSERT INTO books (isbn, title, author, status) VALUES (?1, ?2, ?3, ?4)",
        params![book.isbn, book.title, book.author, BookStatus::Available],
    )
    .map_err(|err| {
        if is_unique_violation(&err, Some("books.isbn")) {
            LibraryError::DuplicateIsbn(book.isbn.clone()).into()
        } else {
            anyhow::Error::new(err).context("failed to insert book")
        }
    })?;

    Ok(Book {
        id: conn.last_insert_rowid(),
        isbn: book.isbn.clone(),
        title: book.title.clone(),
        author: book.author.clone(),
        status: BookStatus::Available,
    })
}

/// Fetch a single book by primary key.
pub fn find_book(conn: &Connection, id: i64) -> Result<Option<Book>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM books WHERE id = ?1"),
        [id],
        from_row,
    )
    .optional()
    .context("failed to load book")
}

/// Fetch a book by its catalog ISBN.
pub fn find_book_by_isbn(conn: &Connection, isbn: &str) -> Result<Option<Book>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM books WHERE isbn = ?1"),
        [isbn],
        from_row,
    )
    .optional()
    .context("failed to load book by ISBN")
}

/// Every book ordered by title so listings read alphabetically.
pub fn fetch_books(conn: &Connection) -> Result<Vec<Book>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM books ORDER BY title COLLATE NOCASE, id"
        ))
        .context("failed to prepare book query")?;

    let books = stmt
        .query_map([], from_row)
        .context("failed to load books")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect books")?;

    Ok(books)
}

/// Overwrite the stored circulation status of a book.
pub fn update_book_status(conn: &Connection, id: i64, status: BookStatus) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE books SET status = ?1 WHERE id = ?2",
            params![status, id],
        )
        .context("failed to update book status")?;

    if updated == 0 {
        Err(anyhow!("Book not found"))
    } else {
        Ok(())
    }
}

/// Remove a book. Its circulation history cascades with it.
pub fn delete_book(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM books WHERE id = ?1", params![id])
        .context("failed to delete book")?;

    if deleted == 0 {
        Err(anyhow!("Book not found"))
    } else {
        Ok(())
    }
}

/// A book together with the circulation rows that decide its status.
#[derive(Debug, Clone, PartialEq)]
pub struct BookCirculation {
    pub book: Book,
    pub active_borrowings: u32,
    pub waiting_reservations: u32,
}

/// Per-book counts of active borrowings and waiting reservations, used to
/// audit that stored statuses agree with the circulation tables.
pub fn fetch_circulation_counts(conn: &Connection) -> Result<Vec<BookCirculation>> {
    let mut stmt = conn
        .prepare(
            "SELECT b.id, b.isbn, b.title, b.author, b.status,
                    (SELECT COUNT(*) FROM borrowings br
                     WHERE br.book_id = b.id AND br.status = 'BORROWED'),
                    (SELECT COUNT(*) FROM reservations r
                     WHERE r.book_id = b.id AND r.status = 'WAITING')
             FROM books b
             ORDER BY b.id",
        )
        .context("failed to prepare circulation audit query")?;

    let counts = stmt
        .query_map([], |row| {
            Ok(BookCirculation {
                book: from_row(row)?,
                active_borrowings: row.get(5)?,
                waiting_reservations: row.get(6)?,
            })
        })
        .context("failed to load circulation counts")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect circulation counts")?;

    Ok(counts)
}
